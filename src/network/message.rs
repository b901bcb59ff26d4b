//! Wire format of the peer protocol.
//!
//! Every message is a 12-byte NUL-padded ASCII command followed by the binary
//! payload. The payload is the bincode encoding of [`Package`]; the command
//! bytes must agree with the decoded variant, so a frame whose header and body
//! disagree is rejected as malformed.

use crate::error::{CoinError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const COMMAND_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Block,
    Tx,
}

/// One peer-protocol message. `addr_from` is always the listen address of the
/// originating node, not the ephemeral connection address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Package {
    Version {
        addr_from: SocketAddr,
        version: usize,
        best_height: i64,
    },
    Addr {
        addr_from: SocketAddr,
        addresses: Vec<SocketAddr>,
    },
    Inv {
        addr_from: SocketAddr,
        op_type: OpType,
        items: Vec<Vec<u8>>,
    },
    GetBlocks {
        addr_from: SocketAddr,
    },
    GetData {
        addr_from: SocketAddr,
        op_type: OpType,
        id: Vec<u8>,
    },
    Block {
        addr_from: SocketAddr,
        block: Vec<u8>,
    },
    Tx {
        addr_from: SocketAddr,
        transaction: Vec<u8>,
    },
}

impl Package {
    pub fn command(&self) -> &'static str {
        match self {
            Package::Version { .. } => "version",
            Package::Addr { .. } => "addr",
            Package::Inv { .. } => "inv",
            Package::GetBlocks { .. } => "getblocks",
            Package::GetData { .. } => "getdata",
            Package::Block { .. } => "block",
            Package::Tx { .. } => "tx",
        }
    }

    pub fn addr_from(&self) -> SocketAddr {
        match self {
            Package::Version { addr_from, .. }
            | Package::Addr { addr_from, .. }
            | Package::Inv { addr_from, .. }
            | Package::GetBlocks { addr_from }
            | Package::GetData { addr_from, .. }
            | Package::Block { addr_from, .. }
            | Package::Tx { addr_from, .. } => *addr_from,
        }
    }

    fn padded_command(command: &str) -> [u8; COMMAND_LENGTH] {
        let mut header = [0u8; COMMAND_LENGTH];
        header[..command.len()].copy_from_slice(command.as_bytes());
        header
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::MalformedMessage(e.to_string()))?;
        let mut frame = Vec::with_capacity(COMMAND_LENGTH + payload.len());
        frame.extend_from_slice(&Self::padded_command(self.command()));
        frame.extend(payload);
        Ok(frame)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Package> {
        if bytes.len() < COMMAND_LENGTH {
            return Err(CoinError::MalformedMessage(format!(
                "frame of {} bytes is shorter than the command header",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(COMMAND_LENGTH);

        let (pkg, consumed): (Package, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| CoinError::MalformedMessage(e.to_string()))?;
        if consumed != payload.len() {
            return Err(CoinError::MalformedMessage(format!(
                "{} trailing bytes after payload",
                payload.len() - consumed
            )));
        }
        if header != Self::padded_command(pkg.command()) {
            return Err(CoinError::MalformedMessage(format!(
                "command header {:?} does not match payload kind {:?}",
                String::from_utf8_lossy(header),
                pkg.command()
            )));
        }
        Ok(pkg)
    }
}
