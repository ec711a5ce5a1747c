//! Trait abstraction for datagram socket operations to enable testing

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// Trait for connectionless datagram I/O with a single peer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatagramIO: Send {
    /// Send one datagram to the peer
    async fn send_datagram(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait for the next datagram and copy it into `buf`
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Change the destination of future datagrams
    fn set_peer(&mut self, peer: SocketAddr);
}

/// `tokio::net::UdpSocket` that remembers its peer
#[derive(Debug)]
pub struct TokioUdpSocket {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl TokioUdpSocket {
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl DatagramIO for TokioUdpSocket {
    async fn send_datagram(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.peer).await.map(|_| ())
    }

    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Replies may come from any address (the PDU may have just changed IP)
        let (len, _from) = self.socket.recv_from(buf).await?;
        Ok(len)
    }

    fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_socket_round_trip() {
        let pdu = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let pdu_addr = pdu.local_addr().unwrap();

        let ground = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut ground = TokioUdpSocket::new(ground, pdu_addr);
        let ground_addr = ground.local_addr().unwrap();
        assert_eq!(ground.peer(), pdu_addr);

        ground.send_datagram(b"STATUS,1").await.unwrap();
        let mut buf = [0u8; 64];
        let (len, from) = pdu.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"STATUS,1");
        assert_eq!(from, ground_addr);

        pdu.send_to(b"STATUS,1,0.512", ground_addr).await.unwrap();
        let len = ground.recv_datagram(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"STATUS,1,0.512");
    }

    #[test]
    fn test_mock_returns_inbound_in_order() {
        let mut mock = mocks::MockDatagramSocket::new();
        mock.push_inbound(b"SRVCSET,1,1");
        mock.push_inbound(b"STATUS,1,0.500");

        let mut buf = [0u8; 64];
        let len = tokio_test::block_on(mock.recv_datagram(&mut buf)).unwrap();
        assert_eq!(&buf[..len], b"SRVCSET,1,1");
        let len = tokio_test::block_on(mock.recv_datagram(&mut buf)).unwrap();
        assert_eq!(&buf[..len], b"STATUS,1,0.500");
    }

    #[tokio::test]
    async fn test_mock_records_sent_datagrams() {
        let mut mock = mocks::MockDatagramSocket::new();
        mock.send_datagram(b"RESET").await.unwrap();
        assert_eq!(mock.get_sent(), vec![b"RESET".to_vec()]);

        mock.set_send_error(io::ErrorKind::BrokenPipe);
        assert!(mock.send_datagram(b"RESET").await.is_err());
        assert_eq!(mock.get_sent().len(), 1);
    }
}
