//! Sequential reader over one aggregated log file.
//!
//! [`LogFileReader`] validates the magic, decodes the header, then hands
//! out one [`ContainerRecord`] at a time. Each container's payload is a
//! length-bounded window of the stream: every read inside a record is
//! charged against that bound, so a declared segment length that overruns
//! its container, or a stream that ends mid-record, is detected as
//! corruption instead of silently desynchronizing later records.
//!
//! A record the caller abandons half-read is drained automatically when
//! the next container is requested; later containers never depend on the
//! caller having consumed earlier ones exactly.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::format::{self, FileHeader, SegmentHeader};

const COPY_BUF_LEN: usize = 64 * 1024;

pub struct LogFileReader<R> {
    stream: R,
    header: FileHeader,
    /// Unread payload bytes of the container currently being scanned.
    remaining: u64,
}

impl<R> LogFileReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Open the stream: validate the magic and decode the header.
    ///
    /// The header lives at a fixed early offset, so this never scans
    /// records; owner/ACL peeks stop here.
    pub async fn open(mut stream: R) -> Result<Self> {
        format::read_magic(&mut stream).await?;
        let header = format::read_header(&mut stream).await?;
        Ok(Self {
            stream,
            header,
            remaining: 0,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn into_header(self) -> FileHeader {
        self.header
    }

    /// Advance to the next container record, or `Ok(None)` at clean
    /// end-of-file. Whatever the caller left unread of the previous
    /// container is skipped first.
    pub async fn next_container(&mut self) -> Result<Option<ContainerRecord<'_, R>>> {
        if self.remaining > 0 {
            format::skip_exact(&mut self.stream, self.remaining).await?;
            self.remaining = 0;
        }
        match format::read_container_key(&mut self.stream).await? {
            None => Ok(None),
            Some((container_id, payload_len)) => {
                self.remaining = payload_len;
                Ok(Some(ContainerRecord {
                    reader: self,
                    container_id,
                }))
            }
        }
    }
}

/// One container's record: its id plus a bounded view of its segments.
pub struct ContainerRecord<'a, R> {
    reader: &'a mut LogFileReader<R>,
    container_id: String,
}

impl<R> ContainerRecord<'_, R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Deduct `n` bytes from the container's payload budget.
    fn charge(&mut self, n: u64, what: &str) -> Result<()> {
        if self.reader.remaining < n {
            return Err(Error::corrupt(format!(
                "container payload ends inside {what}"
            )));
        }
        self.reader.remaining -= n;
        Ok(())
    }

    /// Decode the next segment header, or `Ok(None)` when the payload is
    /// exhausted exactly at a header boundary (the normal end of the
    /// container's segment list).
    pub async fn next_segment(&mut self) -> Result<Option<SegmentHeader>> {
        if self.reader.remaining == 0 {
            return Ok(None);
        }
        self.charge(4, "segment type length")?;
        let type_len = format::read_u32_owed(&mut self.reader.stream, "segment type length").await?;
        format::check_string_len(type_len, "segment type")?;
        self.charge(u64::from(type_len), "segment type")?;
        let file_type =
            format::read_string_body(&mut self.reader.stream, type_len, "segment type").await?;
        self.charge(8, "segment length")?;
        let length = format::read_u64_owed(&mut self.reader.stream, "segment length").await?;
        if length > self.reader.remaining {
            return Err(Error::corrupt(format!(
                "declared segment length {length} overruns container payload"
            )));
        }
        Ok(Some(SegmentHeader { file_type, length }))
    }

    /// Stream this segment's content to `sink`, bounded by `cap`.
    ///
    /// A positive cap emits the first `cap` bytes, a negative cap the
    /// last `cap.abs()`, `None` everything; whatever is not emitted is
    /// skipped so the stream always lands on the next segment boundary.
    /// Returns the number of bytes written to `sink`.
    pub async fn copy_content<W>(
        &mut self,
        segment: &SegmentHeader,
        cap: Option<i64>,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let len = segment.length;
        let (skip_front, emit) = match cap {
            None => (0, len),
            Some(n) if n >= 0 => (0, len.min(n as u64)),
            Some(n) => {
                let tail = len.min(n.unsigned_abs());
                (len - tail, tail)
            }
        };
        let skip_back = len - skip_front - emit;

        if skip_front > 0 {
            self.consume_skip(skip_front).await?;
        }

        self.charge(emit, "segment content")?;
        let mut left = emit;
        let mut buf = vec![0u8; COPY_BUF_LEN];
        while left > 0 {
            let want = buf.len().min(usize::try_from(left).unwrap_or(buf.len()));
            let got = self.reader.stream.read(&mut buf[..want]).await?;
            if got == 0 {
                return Err(Error::corrupt("stream ended inside segment content"));
            }
            sink.write_all(&buf[..got]).await?;
            left -= got as u64;
        }

        if skip_back > 0 {
            self.consume_skip(skip_back).await?;
        }
        Ok(emit)
    }

    /// Skip this segment's content entirely, using only its declared
    /// length; the bytes are never materialized.
    pub async fn skip_content(&mut self, segment: &SegmentHeader) -> Result<()> {
        self.consume_skip(segment.length).await
    }

    async fn consume_skip(&mut self, n: u64) -> Result<()> {
        self.charge(n, "segment content")?;
        format::skip_exact(&mut self.reader.stream, n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AccessType, AclMap};

    /// Hand-encode a complete file the way the writer does, so reader
    /// tests do not depend on writer plumbing.
    async fn encode_file(header: &FileHeader, containers: &[(&str, Vec<(&str, &[u8])>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        format::write_magic(&mut buf).await.unwrap();
        format::write_header(&mut buf, header).await.unwrap();
        for (id, segments) in containers {
            let payload_len: u64 = segments
                .iter()
                .map(|(t, c)| format::segment_wire_len(t, c.len() as u64))
                .sum();
            format::write_container_key(&mut buf, id, payload_len)
                .await
                .unwrap();
            for (file_type, content) in segments {
                format::write_segment_header(&mut buf, file_type, content.len() as u64)
                    .await
                    .unwrap();
                buf.extend_from_slice(content);
            }
        }
        buf
    }

    fn header() -> FileHeader {
        let mut acls = AclMap::new();
        acls.insert(AccessType::View, "ops".to_string());
        FileHeader {
            owner: "svc-etl".to_string(),
            acls,
        }
    }

    #[tokio::test]
    async fn round_trip_containers_and_segments_in_order() {
        let file = encode_file(
            &header(),
            &[
                ("c1", vec![("stdout", b"hello".as_ref()), ("stderr", b"")]),
                ("c2", vec![("syslog", b"abcdefgh")]),
            ],
        )
        .await;

        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        assert_eq!(reader.header(), &header());

        let mut seen = Vec::new();
        while let Some(mut record) = reader.next_container().await.unwrap() {
            let id = record.container_id().to_string();
            while let Some(seg) = record.next_segment().await.unwrap() {
                let mut content = Vec::new();
                let n = record
                    .copy_content(&seg, None, &mut content)
                    .await
                    .unwrap();
                assert_eq!(n, seg.length);
                seen.push((id.clone(), seg.file_type, content));
            }
        }

        assert_eq!(
            seen,
            vec![
                ("c1".to_string(), "stdout".to_string(), b"hello".to_vec()),
                ("c1".to_string(), "stderr".to_string(), Vec::new()),
                ("c2".to_string(), "syslog".to_string(), b"abcdefgh".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn zero_containers_is_a_valid_file() {
        let file = encode_file(&header(), &[]).await;
        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        assert!(reader.next_container().await.unwrap().is_none());
        // End-of-stream is stable: asking again still reports the end.
        assert!(reader.next_container().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_leaves_stream_positioned_like_a_full_read() {
        let file = encode_file(
            &header(),
            &[(
                "c1",
                vec![("stdout", b"unwanted bytes".as_ref()), ("stderr", b"kept")],
            )],
        )
        .await;

        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();

        let first = record.next_segment().await.unwrap().unwrap();
        assert_eq!(first.file_type, "stdout");
        record.skip_content(&first).await.unwrap();

        // The next header decodes correctly only if the skip advanced by
        // exactly the declared length.
        let second = record.next_segment().await.unwrap().unwrap();
        assert_eq!(second.file_type, "stderr");
        let mut content = Vec::new();
        record.copy_content(&second, None, &mut content).await.unwrap();
        assert_eq!(content, b"kept");
        assert!(record.next_segment().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abandoned_record_is_drained_before_next_container() {
        let file = encode_file(
            &header(),
            &[
                ("c1", vec![("stdout", b"ignored entirely".as_ref())]),
                ("c2", vec![("stderr", b"wanted".as_ref())]),
            ],
        )
        .await;

        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        {
            let record = reader.next_container().await.unwrap().unwrap();
            assert_eq!(record.container_id(), "c1");
            // Dropped without reading any segment.
        }
        let mut record = reader.next_container().await.unwrap().unwrap();
        assert_eq!(record.container_id(), "c2");
        let seg = record.next_segment().await.unwrap().unwrap();
        let mut content = Vec::new();
        record.copy_content(&seg, None, &mut content).await.unwrap();
        assert_eq!(content, b"wanted");
    }

    #[tokio::test]
    async fn head_and_tail_byte_caps() {
        let file = encode_file(&header(), &[("c1", vec![("stdout", b"0123456789".as_ref())])]).await;

        // First three bytes.
        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        let seg = record.next_segment().await.unwrap().unwrap();
        let mut head = Vec::new();
        assert_eq!(record.copy_content(&seg, Some(3), &mut head).await.unwrap(), 3);
        assert_eq!(head, b"012");
        // The cap must not desynchronize the stream.
        assert!(record.next_segment().await.unwrap().is_none());

        // Last three bytes.
        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        let seg = record.next_segment().await.unwrap().unwrap();
        let mut tail = Vec::new();
        assert_eq!(record.copy_content(&seg, Some(-3), &mut tail).await.unwrap(), 3);
        assert_eq!(tail, b"789");
        assert!(record.next_segment().await.unwrap().is_none());

        // Cap larger than the segment emits everything.
        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        let seg = record.next_segment().await.unwrap().unwrap();
        let mut all = Vec::new();
        assert_eq!(record.copy_content(&seg, Some(100), &mut all).await.unwrap(), 10);
        assert_eq!(all, b"0123456789");
    }

    #[tokio::test]
    async fn truncation_mid_content_is_corrupt() {
        let mut file = encode_file(&header(), &[("c1", vec![("stdout", b"hello world".as_ref())])]).await;
        file.truncate(file.len() - 4);

        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        let seg = record.next_segment().await.unwrap().unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            record.copy_content(&seg, None, &mut out).await,
            Err(Error::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn truncation_mid_segment_header_is_corrupt() {
        let full = encode_file(&header(), &[("c1", vec![("stdout", b"hello".as_ref())])]).await;
        // Cut inside the segment type string.
        let mut file = full.clone();
        let mut probe = Vec::new();
        format::write_magic(&mut probe).await.unwrap();
        format::write_header(&mut probe, &header()).await.unwrap();
        format::write_container_key(&mut probe, "c1", 0).await.unwrap();
        let header_len = probe.len();
        file.truncate(header_len + 6); // 4-byte type length + 2 bytes of "stdout"

        let mut reader = LogFileReader::open(&file[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        assert!(matches!(
            record.next_segment().await,
            Err(Error::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn overlong_declared_length_is_corrupt_even_with_bytes_remaining() {
        // Encoder-bug shape: the declared segment length exceeds what the
        // container claims to hold, but the file as a whole still has
        // bytes left (a second container follows).
        let mut buf = Vec::new();
        format::write_magic(&mut buf).await.unwrap();
        format::write_header(&mut buf, &header()).await.unwrap();
        let payload_len = format::segment_wire_len("stdout", 4);
        format::write_container_key(&mut buf, "c1", payload_len)
            .await
            .unwrap();
        // Lie: declare 400 bytes where the container budget allows 4.
        format::write_segment_header(&mut buf, "stdout", 400)
            .await
            .unwrap();
        buf.extend_from_slice(b"0123");
        format::write_container_key(&mut buf, "c2", 0).await.unwrap();

        let mut reader = LogFileReader::open(&buf[..]).await.unwrap();
        let mut record = reader.next_container().await.unwrap().unwrap();
        match record.next_segment().await {
            Err(Error::Corrupt { reason }) => assert!(reason.contains("overruns")),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_stream_is_corrupt_not_empty_file() {
        match LogFileReader::open(&[][..]).await {
            Err(Error::Corrupt { reason }) => assert!(reason.contains("magic")),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }
}
