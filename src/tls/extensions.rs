//! TLS 1.3 extensions: the fixed ClientHello set and ServerHello parsing.
//!
//! Extension format: type (2 bytes) + length (2 bytes) + data.

use crate::crypto::P256_PUBLIC_KEY_LEN;
use crate::error::Error;

// Extension type codes
pub const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
pub const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
pub const EXT_KEY_SHARE: u16 = 0x0033;

/// Named group secp256r1.
pub const GROUP_SECP256R1: u16 = 0x0017;

/// rsa_pss_rsae_sha256, the only signature scheme advertised.
pub const SIG_RSA_PSS_RSAE_SHA256: u16 = 0x0804;

pub const TLS13_VERSION: u16 = 0x0304;

/// Encoded size of the four ClientHello extensions.
pub const CLIENT_HELLO_EXTENSIONS_LEN: usize = 8 + 8 + 7 + 4 + 2 + 4 + P256_PUBLIC_KEY_LEN;

/// Parsed extensions from ServerHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHelloExtensions {
    /// Selected TLS version (0x0304 for TLS 1.3), 0 if absent.
    pub selected_version: u16,
    /// Server's uncompressed P-256 point from the key_share extension.
    pub key_share: Option<[u8; P256_PUBLIC_KEY_LEN]>,
}

/// Write a 2-byte big-endian value.
fn put_u16(buf: &mut [u8], off: &mut usize, val: u16) -> Result<(), Error> {
    if buf.len() < *off + 2 {
        return Err(Error::BufferTooSmall { needed: *off + 2 });
    }
    buf[*off..*off + 2].copy_from_slice(&val.to_be_bytes());
    *off += 2;
    Ok(())
}

fn put_bytes(buf: &mut [u8], off: &mut usize, data: &[u8]) -> Result<(), Error> {
    if buf.len() < *off + data.len() {
        return Err(Error::BufferTooSmall {
            needed: *off + data.len(),
        });
    }
    buf[*off..*off + data.len()].copy_from_slice(data);
    *off += data.len();
    Ok(())
}

/// Read a 2-byte big-endian value.
fn get_u16(data: &[u8], off: &mut usize) -> Result<u16, Error> {
    if data.len() < *off + 2 {
        return Err(Error::Tls);
    }
    let val = u16::from_be_bytes([data[*off], data[*off + 1]]);
    *off += 2;
    Ok(val)
}

/// Walk an extension block, yielding `(type, data)` pairs.
fn for_each_extension<'a>(
    data: &'a [u8],
    mut visit: impl FnMut(u16, &'a [u8]) -> Result<(), Error>,
) -> Result<(), Error> {
    let mut off = 0;
    while off < data.len() {
        let ext_type = get_u16(data, &mut off)?;
        let ext_len = get_u16(data, &mut off)? as usize;
        if off + ext_len > data.len() {
            return Err(Error::Tls);
        }
        visit(ext_type, &data[off..off + ext_len])?;
        off += ext_len;
    }
    Ok(())
}

/// Encode the fixed ClientHello extensions.
///
/// Order on the wire: supported_groups, signature_algorithms,
/// supported_versions, key_share.
pub fn encode_client_hello_extensions(
    public_key: &[u8; P256_PUBLIC_KEY_LEN],
    buf: &mut [u8],
) -> Result<usize, Error> {
    let mut off = 0;

    // --- supported_groups: named_group_list(2) + secp256r1 ---
    put_u16(buf, &mut off, EXT_SUPPORTED_GROUPS)?;
    put_u16(buf, &mut off, 4)?;
    put_u16(buf, &mut off, 2)?;
    put_u16(buf, &mut off, GROUP_SECP256R1)?;

    // --- signature_algorithms ---
    put_u16(buf, &mut off, EXT_SIGNATURE_ALGORITHMS)?;
    put_u16(buf, &mut off, 4)?;
    put_u16(buf, &mut off, 2)?;
    put_u16(buf, &mut off, SIG_RSA_PSS_RSAE_SHA256)?;

    // --- supported_versions: list_length(1) + version(2) ---
    put_u16(buf, &mut off, EXT_SUPPORTED_VERSIONS)?;
    put_u16(buf, &mut off, 3)?;
    put_bytes(buf, &mut off, &[2])?;
    put_u16(buf, &mut off, TLS13_VERSION)?;

    // --- key_share: client_shares(2) + group(2) + key_length(2) + key ---
    let ks_entry_len = 2 + 2 + P256_PUBLIC_KEY_LEN;
    put_u16(buf, &mut off, EXT_KEY_SHARE)?;
    put_u16(buf, &mut off, (2 + ks_entry_len) as u16)?;
    put_u16(buf, &mut off, ks_entry_len as u16)?;
    put_u16(buf, &mut off, GROUP_SECP256R1)?;
    put_u16(buf, &mut off, P256_PUBLIC_KEY_LEN as u16)?;
    put_bytes(buf, &mut off, public_key)?;

    Ok(off)
}

/// Parse ServerHello extensions.
///
/// A key share for any group other than secp256r1, or of the wrong size, is
/// an error.
pub fn parse_server_hello_extensions(data: &[u8]) -> Result<ServerHelloExtensions, Error> {
    let mut result = ServerHelloExtensions {
        selected_version: 0,
        key_share: None,
    };

    for_each_extension(data, |ext_type, ext_data| {
        match ext_type {
            EXT_SUPPORTED_VERSIONS => {
                // ServerHello: just the selected version (2 bytes)
                if ext_data.len() != 2 {
                    return Err(Error::Tls);
                }
                result.selected_version = u16::from_be_bytes([ext_data[0], ext_data[1]]);
            }
            EXT_KEY_SHARE => {
                // ServerHello KeyShareEntry: group(2) + key_length(2) + key
                let mut off = 0;
                let group = get_u16(ext_data, &mut off)?;
                let key_len = get_u16(ext_data, &mut off)? as usize;
                if group != GROUP_SECP256R1 || key_len != P256_PUBLIC_KEY_LEN {
                    return Err(Error::Tls);
                }
                let key: [u8; P256_PUBLIC_KEY_LEN] = ext_data
                    .get(off..off + key_len)
                    .and_then(|k| k.try_into().ok())
                    .ok_or(Error::Tls)?;
                result.key_share = Some(key);
            }
            _ => {}
        }
        Ok(())
    })?;

    Ok(result)
}
