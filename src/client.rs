//! File client: request a file and receive it.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::AsyncWrite;

use crate::channel::Channel;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::Packet;
use crate::receiver::{self, ReceiveReport, ReceiverOptions};
use crate::simulator::Simulator;
use crate::socket::{Socket, Transport};

/// Choose the address to contact among those a host name resolved to.
///
/// IPv4 wins: `localhost` often lists `::1` first, which a server bound to
/// `0.0.0.0` never answers.
pub fn pick_server_addr(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut first = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        first.get_or_insert(addr);
    }
    first
}

/// Fetch `file_name` from `server` into a new file at `output`.
///
/// A partially written output file is removed if the transfer fails.
pub async fn fetch(
    server: SocketAddr,
    file_name: &str,
    output: &Path,
    config: &TransferConfig,
) -> Result<ReceiveReport, TransferError> {
    config.validate()?;
    let local: SocketAddr = if server.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = Socket::bind(local).await?;
    let mut channel = Channel::new(socket, Simulator::new(config.simulator.clone())?);

    let mut file = tokio::fs::File::create(output)
        .await
        .map_err(|source| TransferError::File { path: output.to_path_buf(), source })?;

    let result = request_file(&mut channel, server, file_name, &mut file, config).await;
    if result.is_err() {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(output).await {
            log::warn!("[client] could not remove partial {}: {e}", output.display());
        }
    }
    result
}

/// Request `file_name` from `server` over `channel` and write it to `sink`.
pub async fn request_file<T, W>(
    channel: &mut Channel<T>,
    server: SocketAddr,
    file_name: &str,
    sink: &mut W,
    config: &TransferConfig,
) -> Result<ReceiveReport, TransferError>
where
    T: Transport,
    W: AsyncWrite + Unpin + Send,
{
    if file_name.is_empty() {
        return Err(TransferError::InvalidFileName(String::new()));
    }
    let request = Packet::request(file_name)?;
    log::info!("[client] requesting {file_name:?} from {server}");

    let opts = ReceiverOptions {
        time_wait: config.time_wait,
        request: Some(request),
        retry_interval: config.retransmit_timeout,
        max_retries: config.max_retries,
    };
    receiver::receive(channel, server, sink, opts).await
}
