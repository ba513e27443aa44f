// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Framing and acknowledgement primitives shared by client and server.
//
// Every LPD command is a single code byte, operands separated by one space,
// and a terminating LF:
//
// ```text
// +------+---------+----+---------+----+
// | code | operand | SP | operand | LF |
// +------+---------+----+---------+----+
// ```
//
// Acknowledgements are single bytes; zero means success.  Both engines wrap
// their read side in a `BufReader`, so the byte-at-a-time reads here do not
// turn into one syscall per byte.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use lpd_core::error::{LpdError, Result};
use lpd_core::types::{Ack, Charset, LF, SP};

/// Longest command line accepted before the peer is treated as hostile.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Encode a command line: code byte, operands joined by SP, LF.
pub fn encode_command_line(code: u8, operands: &[&str], charset: Charset) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(2 + operands.iter().map(|o| o.len() + 1).sum::<usize>());
    buf.push(code);
    for (i, operand) in operands.iter().enumerate() {
        if operand.as_bytes().contains(&LF) {
            return Err(LpdError::Protocol(format!(
                "operand {i} of command {code} contains a line feed"
            )));
        }
        if i > 0 {
            buf.push(SP);
        }
        buf.extend_from_slice(&charset.encode(operand));
    }
    buf.push(LF);
    Ok(buf)
}

/// Write one command line and flush it.
pub async fn write_command_line<W>(
    writer: &mut W,
    code: u8,
    operands: &[&str],
    charset: Charset,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let line = encode_command_line(code, operands, charset)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    debug!(code, bytes = line.len(), "command line sent");
    Ok(())
}

/// Read a single byte, or `None` at end of stream.
pub async fn read_byte<R>(reader: &mut R) -> Result<Option<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    match reader.read(&mut byte).await? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

/// Read up to the next LF (or end of stream) and decode it, without the
/// terminator.
pub async fn read_line<R>(reader: &mut R, charset: Charset) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    while let Some(byte) = read_byte(reader).await? {
        if byte == LF {
            break;
        }
        if buf.len() == MAX_LINE_BYTES {
            return Err(LpdError::Protocol(format!(
                "command line exceeds {MAX_LINE_BYTES} byte"
            )));
        }
        buf.push(byte);
    }
    Ok(charset.decode(&buf))
}

/// Read exactly `n` bytes or fail with [`LpdError::UnexpectedEof`].
pub async fn read_exact<R>(reader: &mut R, n: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            return Err(LpdError::UnexpectedEof {
                expected: n,
                received: filled,
            });
        }
        filled += read;
    }
    Ok(buf)
}

/// Read everything until the peer closes its write side.
pub async fn read_until_close<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Read one acknowledgement byte; anything but zero is a [`LpdError::Nack`].
pub async fn expect_ack<R>(reader: &mut R, stage: &'static str) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let ack = read_exact(reader, 1).await?;
    match Ack(ack[0]) {
        ack if ack.is_success() => Ok(()),
        Ack(code) => Err(LpdError::Nack { stage, code }),
    }
}

/// Write one acknowledgement byte and flush it.
pub async fn write_ack<W>(writer: &mut W, ack: Ack) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&[ack.byte()]).await?;
    writer.flush().await?;
    Ok(())
}

/// Split a command line into whitespace-separated operands.
pub fn split_operands(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Split a job list into tokens. Entries may be separated by commas,
/// whitespace, or both.
pub fn split_job_list<'a>(operands: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    operands
        .into_iter()
        .flat_map(|operand| operand.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_layout() {
        let line = encode_command_line(3, &["RAW", "job1,job2"], Charset::Ascii).unwrap();
        assert_eq!(line, b"\x03RAW job1,job2\n");
    }

    #[test]
    fn command_line_without_operands() {
        let line = encode_command_line(1, &[], Charset::Ascii).unwrap();
        assert_eq!(line, b"\x01\n");
    }

    #[test]
    fn operand_with_line_feed_is_rejected() {
        let err = encode_command_line(1, &["RA\nW"], Charset::Ascii).unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn read_line_stops_at_lf() {
        let mut input: &[u8] = b"RAW\nrest";
        assert_eq!(read_line(&mut input, Charset::Ascii).await.unwrap(), "RAW");
        assert_eq!(input, b"rest");
    }

    #[tokio::test]
    async fn read_line_accepts_end_of_stream() {
        let mut input: &[u8] = b"RAW";
        assert_eq!(read_line(&mut input, Charset::Ascii).await.unwrap(), "RAW");
        assert_eq!(read_line(&mut input, Charset::Ascii).await.unwrap(), "");
    }

    #[tokio::test]
    async fn read_line_decodes_latin1() {
        let mut input: &[u8] = b"q\xe4\n";
        assert_eq!(read_line(&mut input, Charset::Latin1).await.unwrap(), "q\u{e4}");
    }

    #[tokio::test]
    async fn read_line_rejects_unbounded_input() {
        let long = vec![b'a'; MAX_LINE_BYTES + 1];
        let mut input: &[u8] = &long;
        assert!(read_line(&mut input, Charset::Ascii).await.unwrap_err().is_protocol());
    }

    #[tokio::test]
    async fn read_exact_reports_short_read() {
        let mut input: &[u8] = b"ab";
        match read_exact(&mut input, 4).await {
            Err(LpdError::UnexpectedEof { expected, received }) => {
                assert_eq!(expected, 4);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ack_handling() {
        let mut input: &[u8] = &[0, 7];
        expect_ack(&mut input, "first").await.unwrap();
        match expect_ack(&mut input, "second").await {
            Err(LpdError::Nack { stage, code }) => {
                assert_eq!(stage, "second");
                assert_eq!(code, 7);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            expect_ack(&mut input, "third").await,
            Err(LpdError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn read_until_close_returns_everything() {
        let mut input: &[u8] = b"job1\njob2\n";
        assert_eq!(read_until_close(&mut input).await.unwrap(), b"job1\njob2\n");
    }

    #[test]
    fn job_list_tokens() {
        assert_eq!(
            split_job_list(["a,b", "c", ",d,"]),
            vec!["a", "b", "c", "d"]
        );
        assert!(split_job_list(Vec::<&str>::new()).is_empty());
    }
}
