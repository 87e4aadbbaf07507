//! Wire codec for aggregated log files.
//!
//! One file multiplexes every container's log files for one node and one
//! aggregation cycle. The layout is an explicit tagged record stream; no
//! reflective serialization is involved, so the format is reproducible
//! bit-for-bit:
//!
//! ```text
//! file      := magic[8]("AGLF0001") header container*
//! header    := owner:str acl_count:u32 (acl_kind:u8 acl_value:str)*
//! container := key:str payload_len:u64 payload
//! payload   := segment*                 -- exactly payload_len bytes
//! segment   := file_type:str length:u64 content[length]
//! str       := len:u32 utf8[len]
//! ```
//!
//! All integers are little-endian. The header sits at a fixed early
//! offset so owner/ACL lookups never scan records. There is no explicit
//! end-of-records marker: clean end-of-stream where a container key would
//! start is the normal end of the file, and exhausting a container's
//! payload where a segment header would start is the normal end of that
//! container. End-of-stream anywhere else is corruption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub const MAGIC: [u8; 8] = *b"AGLF0001";

/// Upper bound on any length-prefixed string. A length above this is
/// taken as framing corruption rather than attempted as an allocation.
pub const MAX_STRING_LEN: u32 = 64 * 1024;

/// Access-control entry kinds carried in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessType {
    View,
    Modify,
}

impl AccessType {
    fn wire_tag(self) -> u8 {
        match self {
            AccessType::View => 1,
            AccessType::Modify => 2,
        }
    }

    fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(AccessType::View),
            2 => Some(AccessType::Modify),
            _ => None,
        }
    }
}

/// Access-control entries: kind to space-separated principal names.
pub type AclMap = BTreeMap<AccessType, String>;

/// The once-per-file header: application owner and ACLs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub owner: String,
    pub acls: AclMap,
}

/// One segment's header as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    pub file_type: String,
    pub length: u64,
}

pub(crate) fn string_wire_len(s: &str) -> u64 {
    4 + s.len() as u64
}

/// The encoded size of one segment, computable before its content is read.
pub(crate) fn segment_wire_len(file_type: &str, content_len: u64) -> u64 {
    string_wire_len(file_type) + 8 + content_len
}

pub(crate) async fn write_magic<W>(w: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(&MAGIC).await
}

pub(crate) async fn write_string<W>(w: &mut W, s: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_u32_le(s.len() as u32).await?;
    w.write_all(s.as_bytes()).await
}

pub(crate) async fn write_header<W>(w: &mut W, header: &FileHeader) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_string(w, &header.owner).await?;
    w.write_u32_le(header.acls.len() as u32).await?;
    for (kind, value) in &header.acls {
        w.write_u8(kind.wire_tag()).await?;
        write_string(w, value).await?;
    }
    Ok(())
}

pub(crate) async fn write_container_key<W>(
    w: &mut W,
    container_id: &str,
    payload_len: u64,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_string(w, container_id).await?;
    w.write_u64_le(payload_len).await
}

pub(crate) async fn write_segment_header<W>(
    w: &mut W,
    file_type: &str,
    length: u64,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_string(w, file_type).await?;
    w.write_u64_le(length).await
}

/// Fill `buf` exactly, or report clean end-of-stream.
///
/// Returns `Ok(false)` only when the stream ended before the first byte;
/// ending partway through `buf` is corruption.
pub(crate) async fn read_exact_or_eof<R>(r: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::corrupt("stream ended inside a record field"));
        }
        filled += n;
    }
    Ok(true)
}

/// Fill `buf` exactly; any end-of-stream is corruption. `what` names the
/// field being read for the error message.
pub(crate) async fn read_exact_owed<R>(r: &mut R, buf: &mut [u8], what: &str) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if read_exact_or_eof(r, buf).await? {
        Ok(())
    } else {
        Err(Error::corrupt(format!("stream ended reading {what}")))
    }
}

pub(crate) async fn read_u32_owed<R>(r: &mut R, what: &str) -> Result<u32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 4];
    read_exact_owed(r, &mut buf, what).await?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) async fn read_u64_owed<R>(r: &mut R, what: &str) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 8];
    read_exact_owed(r, &mut buf, what).await?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn check_string_len(len: u32, what: &str) -> Result<()> {
    if len > MAX_STRING_LEN {
        return Err(Error::corrupt(format!(
            "{what} length {len} exceeds limit {MAX_STRING_LEN}"
        )));
    }
    Ok(())
}

pub(crate) async fn read_string_body<R>(r: &mut R, len: u32, what: &str) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; len as usize];
    read_exact_owed(r, &mut buf, what).await?;
    String::from_utf8(buf).map_err(|_| Error::corrupt(format!("{what} is not valid UTF-8")))
}

pub(crate) async fn read_string_owed<R>(r: &mut R, what: &str) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = read_u32_owed(r, what).await?;
    check_string_len(len, what)?;
    read_string_body(r, len, what).await
}

pub(crate) async fn read_magic<R>(r: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 8];
    read_exact_owed(r, &mut buf, "file magic").await?;
    if buf != MAGIC {
        return Err(Error::corrupt("not an aggregated log file (bad magic)"));
    }
    Ok(())
}

pub(crate) async fn read_header<R>(r: &mut R) -> Result<FileHeader>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let owner = read_string_owed(r, "owner").await?;
    let count = read_u32_owed(r, "acl count").await?;
    let mut acls = AclMap::new();
    for _ in 0..count {
        let mut tag = [0u8; 1];
        read_exact_owed(r, &mut tag, "acl kind").await?;
        let kind = AccessType::from_wire_tag(tag[0])
            .ok_or_else(|| Error::corrupt(format!("unknown acl kind {}", tag[0])))?;
        let value = read_string_owed(r, "acl value").await?;
        acls.insert(kind, value);
    }
    Ok(FileHeader { owner, acls })
}

/// Read the next container key, or `Ok(None)` on clean end-of-file.
pub(crate) async fn read_container_key<R>(r: &mut R) -> Result<Option<(String, u64)>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(r, &mut len_buf).await? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf);
    check_string_len(len, "container id")?;
    let container_id = read_string_body(r, len, "container id").await?;
    let payload_len = read_u64_owed(r, "container payload length").await?;
    Ok(Some((container_id, payload_len)))
}

/// Advance the stream by exactly `n` bytes without materializing them.
///
/// A single read may return fewer bytes than asked, so this loops; a
/// stream that ends short is corrupt.
pub(crate) async fn skip_exact<R>(r: &mut R, mut n: u64) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 8192];
    while n > 0 {
        let want = buf.len().min(usize::try_from(n).unwrap_or(buf.len()));
        let got = r.read(&mut buf[..want]).await?;
        if got == 0 {
            return Err(Error::corrupt(format!(
                "stream ended with {n} bytes of segment content left to skip"
            )));
        }
        n -= got as u64;
    }
    Ok(())
}
