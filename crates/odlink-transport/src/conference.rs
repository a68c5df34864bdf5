use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsRawFd, FromRawFd};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Fixed private multicast prefix; the conference ID is the last octet.
pub const MULTICAST_PREFIX: [u8; 3] = [225, 0, 0];

/// Well-known conference port.
pub const DEFAULT_PORT: u16 = 12175;

/// Maximum UDP payload size (65535 minus IP and UDP headers).
pub const MAX_DATAGRAM: usize = 65507;

/// Derive the multicast group address for a conference ID.
pub fn group_for_cid(cid: u8) -> Ipv4Addr {
    Ipv4Addr::new(
        MULTICAST_PREFIX[0],
        MULTICAST_PREFIX[1],
        MULTICAST_PREFIX[2],
        cid,
    )
}

/// A joined multicast conference.
///
/// Owns the UDP socket lifecycle: bind with address reuse, join the
/// group, best-effort sends. Several processes on one host can join the
/// same conference because `SO_REUSEADDR` is set before the bind.
/// Datagram loss is an accepted property of the medium; `send` neither
/// acknowledges nor retries.
pub struct Conference {
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
}

impl Conference {
    /// Open a conference: bind `0.0.0.0:port` and join the group
    /// derived from `cid` on the system-default interface.
    ///
    /// The 0-255 conference ID range is enforced by the parameter type.
    /// Errors here are fatal; the transport cannot run without its
    /// socket.
    pub fn open(cid: u8, port: u16) -> Result<Self> {
        Self::open_on(cid, port, Ipv4Addr::UNSPECIFIED)
    }

    /// Open a conference on an explicit local interface.
    ///
    /// Multihomed hosts (and loopback-only test environments) need the
    /// membership and egress pinned to one interface instead of
    /// whatever the routing table picks.
    pub fn open_on(cid: u8, port: u16, interface: Ipv4Addr) -> Result<Self> {
        let group = group_for_cid(cid);
        let socket = bind_with_reuse(port)?;
        socket
            .join_multicast_v4(&group, &interface)
            .map_err(|source| TransportError::Join { group, source })?;
        if interface != Ipv4Addr::UNSPECIFIED {
            set_multicast_if_v4(&socket, &interface)
                .map_err(|source| TransportError::Join { group, source })?;
        }

        info!(%group, port, "joined conference");
        Ok(Self {
            socket,
            group,
            port,
        })
    }

    /// Best-effort datagram send to the conference group.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        let sent = self
            .socket
            .send_to(payload, SocketAddrV4::new(self.group, self.port))?;
        debug!(bytes = sent, "sent datagram");
        Ok(sent)
    }

    /// Receive one datagram into `buf`, returning the number of bytes read.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.socket.recv(buf)?)
    }

    /// Set or clear the receive timeout.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Clone the conference handle; both handles share the socket.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            group: self.group,
            port: self.port,
        })
    }

    /// The joined multicast group.
    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl fmt::Debug for Conference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conference")
            .field("group", &self.group)
            .field("port", &self.port)
            .finish()
    }
}

/// Create a UDP socket with `SO_REUSEADDR` set before the bind.
///
/// `std::net::UdpSocket::bind` offers no hook between socket creation
/// and bind, so the socket is built through libc and adopted.
#[cfg(unix)]
fn bind_with_reuse(port: u16) -> Result<UdpSocket> {
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

    // SAFETY: plain socket(2) call; the fd is adopted by UdpSocket
    // immediately below, which closes it on every subsequent error path.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_UDP) };
    if fd < 0 {
        return Err(TransportError::Socket(std::io::Error::last_os_error()));
    }
    // SAFETY: fd was just returned by socket(2) and is owned by no one else.
    let socket = unsafe { UdpSocket::from_raw_fd(fd) };

    let one: libc::c_int = 1;
    // SAFETY: fd is a valid socket and `one` outlives the call.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(TransportError::Socket(std::io::Error::last_os_error()));
    }

    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(Ipv4Addr::UNSPECIFIED).to_be(),
        },
        sin_zero: [0; 8],
    };
    // SAFETY: `addr` is a properly initialized sockaddr_in and the
    // length argument matches its size.
    let rc = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(TransportError::Bind {
            addr: bind_addr,
            source: std::io::Error::last_os_error(),
        });
    }

    Ok(socket)
}

/// Set `IP_MULTICAST_IF` so outgoing multicast leaves via `interface`.
///
/// `std::net::UdpSocket` exposes no setter for this option, so it is
/// applied through libc like the reuse flag above.
#[cfg(unix)]
fn set_multicast_if_v4(socket: &UdpSocket, interface: &Ipv4Addr) -> std::io::Result<()> {
    let addr = libc::in_addr {
        s_addr: u32::from(*interface).to_be(),
    };
    // SAFETY: fd is a valid socket and `addr` is a properly initialized
    // in_addr whose size matches the length argument.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MULTICAST_IF,
            &addr as *const libc::in_addr as *const libc::c_void,
            std::mem::size_of::<libc::in_addr>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test ports sit in the dynamic range, offset by pid so parallel
    // test runs do not collide.
    fn unique_port(tag: u16) -> u16 {
        50000 + (std::process::id() as u16 % 10000) + tag
    }

    #[test]
    fn group_derivation_embeds_the_cid() {
        assert_eq!(group_for_cid(0), Ipv4Addr::new(225, 0, 0, 0));
        assert_eq!(group_for_cid(111), Ipv4Addr::new(225, 0, 0, 111));
        assert_eq!(group_for_cid(255), Ipv4Addr::new(225, 0, 0, 255));
    }

    #[test]
    fn open_binds_and_joins() {
        let port = unique_port(0);
        let conference = Conference::open_on(111, port, Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(conference.group(), Ipv4Addr::new(225, 0, 0, 111));
        assert_eq!(conference.local_addr().unwrap().port(), port);
    }

    #[test]
    fn two_members_share_a_port() {
        let port = unique_port(1);
        let _a = Conference::open_on(42, port, Ipv4Addr::LOCALHOST).unwrap();
        let _b = Conference::open_on(42, port, Ipv4Addr::LOCALHOST).unwrap();
    }

    #[test]
    fn loopback_send_and_receive() {
        let port = unique_port(2);
        let sender = Conference::open_on(77, port, Ipv4Addr::LOCALHOST).unwrap();
        let receiver = sender.try_clone().unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let sent = sender.send(b"conference datagram").unwrap();
        assert_eq!(sent, 19);

        let mut buf = [0u8; MAX_DATAGRAM];
        let read = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..read], b"conference datagram");
    }

    #[test]
    fn debug_names_the_group() {
        let port = unique_port(3);
        let conference = Conference::open_on(9, port, Ipv4Addr::LOCALHOST).unwrap();
        let rendered = format!("{conference:?}");
        assert!(rendered.contains("225.0.0.9"));
    }
}
