//! Length-prefixed frame codec for [`Package`], per ยง6.
//!
//! ```text
//! ┌───────────────┬──────────┬───────┬─────────────────┬─────────────────────┬─────────┐
//! │ length (LE u32)│ command │ flags │ correlation id  │ optional credentials│ payload │
//! │   4 bytes       │ 1 byte  │1 byte │    16 bytes     │ login+password, each │  rest   │
//! │                 │         │       │                 │ length-prefixed 1B   │         │
//! └───────────────┴──────────┴───────┴─────────────────┴─────────────────────┴─────────┘
//! ```
//!
//! `length` covers everything after itself. Frames over [`MAX_FRAME_LEN`] are
//! rejected without buffering their payload.

use crate::{
    error::FrameError,
    package::{CommandTag, Credentials, Package, PackageFlags, MAX_FRAME_LEN},
};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

const LEN_PREFIX: usize = 4;
const HEADER_LEN: usize = 1 + 1 + 16; // command + flags + correlation id

#[derive(Debug, Default)]
pub struct PackageCodec;

impl Encoder<Package> for PackageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Package, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body_len = HEADER_LEN;
        if let Some(creds) = &item.credentials {
            body_len += 1 + creds.login.len() + 1 + creds.password.len();
        }
        body_len += item.payload.len();

        let total = body_len as u32;
        if total > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(total));
        }

        dst.reserve(LEN_PREFIX + body_len);
        dst.put_u32_le(total);
        dst.put_u8(item.command as u8);
        dst.put_u8(item.flags.bits());
        dst.put_slice(item.correlation_id.as_bytes());
        if let Some(creds) = &item.credentials {
            dst.put_u8(creds.login.len() as u8);
            dst.put_slice(creds.login.as_bytes());
            dst.put_u8(creds.password.len() as u8);
            dst.put_slice(creds.password.as_bytes());
        }
        dst.put_slice(&item.payload);
        Ok(())
    }
}

impl Decoder for PackageCodec {
    type Item = Package;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let total = u32::from_le_bytes(src[..LEN_PREFIX].try_into().unwrap());
        if total > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(total));
        }
        let frame_len = LEN_PREFIX + total as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        if src.len() < HEADER_LEN {
            return Err(FrameError::Truncated);
        }

        let command_byte = src.get_u8();
        let command = CommandTag::from_byte(command_byte)
            .ok_or_else(|| FrameError::Malformed(format!("unknown command tag 0x{command_byte:02x}")))?;
        let flags = PackageFlags::from_bits_truncate(src.get_u8());

        let mut id_bytes = [0u8; 16];
        src.copy_to_slice(&mut id_bytes);
        let correlation_id = Uuid::from_bytes(id_bytes);

        let credentials = if flags.contains(PackageFlags::AUTHENTICATED) {
            let login_len = src.get_u8() as usize;
            if src.len() < login_len {
                return Err(FrameError::Truncated);
            }
            let login = String::from_utf8(src.split_to(login_len).to_vec())
                .map_err(|e| FrameError::Malformed(e.to_string()))?;
            if src.is_empty() {
                return Err(FrameError::Truncated);
            }
            let password_len = src.get_u8() as usize;
            if src.len() < password_len {
                return Err(FrameError::Truncated);
            }
            let password = String::from_utf8(src.split_to(password_len).to_vec())
                .map_err(|e| FrameError::Malformed(e.to_string()))?;
            Some(Credentials { login, password })
        } else {
            None
        };

        let payload = src.split_to(src.len()).to_vec();

        Ok(Some(Package { command, flags, correlation_id, credentials, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_package_without_credentials() {
        let mut codec = PackageCodec;
        let pkg = Package::new(CommandTag::HeartbeatRequest, Uuid::new_v4(), vec![1, 2, 3]);
        let mut buf = BytesMut::new();
        codec.encode(pkg.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.command as u8, pkg.command as u8);
        assert_eq!(decoded.correlation_id, pkg.correlation_id);
        assert_eq!(decoded.payload, pkg.payload);
        assert!(decoded.credentials.is_none());
    }

    #[test]
    fn round_trips_a_package_with_credentials() {
        let mut codec = PackageCodec;
        let creds = Credentials { login: "admin".into(), password: "changeit".into() };
        let pkg = Package::new(CommandTag::Authenticate, Uuid::new_v4(), vec![]).with_credentials(creds.clone());
        let mut buf = BytesMut::new();
        codec.encode(pkg, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.credentials, Some(creds));
    }

    #[test]
    fn incomplete_frame_yields_none() {
        let mut codec = PackageCodec;
        let pkg = Package::new(CommandTag::HeartbeatRequest, Uuid::new_v4(), vec![9; 50]);
        let mut buf = BytesMut::new();
        codec.encode(pkg, &mut buf).unwrap();
        buf.truncate(buf.len() - 10);

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = PackageCodec;
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAX_FRAME_LEN + 1);
        assert!(matches!(codec.decode(&mut buf), Err(FrameError::TooLarge(_))));
    }
}
