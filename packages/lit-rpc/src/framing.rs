use std::io::{Error as IoError, ErrorKind};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one newline-terminated frame into `buf`, refusing frames above `max_bytes`.
///
/// Returns `Ok(0)` at EOF. An oversized frame is drained through its newline and
/// reported as `InvalidData`, so the next read starts on a frame boundary.
pub async fn read_frame_bounded<R>(
	reader: &mut R,
	buf: &mut String,
	max_bytes: usize,
) -> std::io::Result<usize>
where
	R: AsyncBufRead + Unpin,
{
	let mut total = 0_usize;
	let mut raw = Vec::new();

	loop {
		let available = reader.fill_buf().await?;

		if available.is_empty() {
			break;
		}

		let (end, found_newline) = match available.iter().position(|byte| *byte == b'\n') {
			Some(pos) => (pos + 1, true),
			None => (available.len(), false),
		};

		if total + end > max_bytes {
			reader.consume(end);

			if !found_newline {
				drain_line(reader).await?;
			}

			return Err(IoError::new(
				ErrorKind::InvalidData,
				format!("Frame exceeds {max_bytes} byte limit."),
			));
		}

		raw.extend_from_slice(&available[..end]);

		total += end;

		reader.consume(end);

		if found_newline {
			break;
		}
	}

	buf.push_str(&String::from_utf8_lossy(&raw));

	Ok(total)
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
	W: AsyncWrite + Unpin + ?Sized,
{
	writer.write_all(frame).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await
}

async fn drain_line<R>(reader: &mut R) -> std::io::Result<()>
where
	R: AsyncBufRead + Unpin,
{
	loop {
		let rest = reader.fill_buf().await?;

		if rest.is_empty() {
			return Ok(());
		}

		match rest.iter().position(|byte| *byte == b'\n') {
			Some(pos) => {
				reader.consume(pos + 1);

				return Ok(());
			},
			None => {
				let len = rest.len();

				reader.consume(len);
			},
		}
	}
}
