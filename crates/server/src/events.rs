use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected { client_id: u32, addr: SocketAddr },
    ConnectionDenied { addr: SocketAddr },
    ClientTimedOut { client_id: u32 },
    GameOver { winners: Vec<u32> },
    Error { message: String },
}
