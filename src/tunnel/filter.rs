//! Per-instruction reader filtering.
//!
//! A [`FilteredReader`] decorates any [`InstructionReader`]: each batch of
//! frames is parsed, every instruction is offered to the filter in order,
//! and the survivors are re-encoded into the returned buffer. Filters
//! compose by wrapping readers, inner filter first.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

use crate::error::{GuacError, Result};
use crate::protocol::{Instruction, ParseError};
use crate::tunnel::InstructionReader;

/// Per-instruction inspection applied to a reader.
///
/// The callback may pass the instruction through unchanged, substitute a
/// different one, drop it from the stream entirely (`Ok(None)`), or fail
/// the read.
#[async_trait]
pub trait InstructionFilter: Send + Sync {
    async fn filter(&self, instruction: Instruction) -> Result<Option<Instruction>>;
}

/// A reader decorated with an [`InstructionFilter`].
pub struct FilteredReader {
    inner: Box<dyn InstructionReader>,
    filter: Arc<dyn InstructionFilter>,
}

impl FilteredReader {
    pub fn new(inner: Box<dyn InstructionReader>, filter: Arc<dyn InstructionFilter>) -> Self {
        Self { inner, filter }
    }
}

#[async_trait]
impl InstructionReader for FilteredReader {
    async fn read_some(&mut self) -> Result<Bytes> {
        loop {
            let raw = self.inner.read_some().await?;
            let text = std::str::from_utf8(&raw)
                .map_err(|_| GuacError::Malformed("invalid UTF-8 on the wire".to_string()))?;

            let mut out = BytesMut::with_capacity(raw.len());
            let mut pos = 0;
            while pos < text.len() {
                let (instruction, consumed) = match Instruction::parse(&text[pos..]) {
                    Ok(parsed) => parsed,
                    Err(ParseError::Incomplete) => {
                        // The inner reader only hands out complete frames.
                        return Err(GuacError::Malformed(
                            "truncated instruction in framed batch".to_string(),
                        ));
                    }
                    Err(err) => return Err(err.into()),
                };
                pos += consumed;
                if let Some(kept) = self.filter.filter(instruction).await? {
                    out.put_slice(&kept.encode());
                }
            }

            // A batch can be consumed entirely by the filter; keep reading
            // so callers always receive at least one frame.
            if !out.is_empty() {
                return Ok(out.freeze());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    struct StaticReader {
        batches: VecDeque<Bytes>,
    }

    impl StaticReader {
        fn new(batches: &[&str]) -> Box<dyn InstructionReader> {
            Box::new(Self {
                batches: batches
                    .iter()
                    .map(|b| Bytes::copy_from_slice(b.as_bytes()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl InstructionReader for StaticReader {
        async fn read_some(&mut self) -> Result<Bytes> {
            self.batches.pop_front().ok_or_else(|| {
                GuacError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "drained"))
            })
        }
    }

    struct DropFilter {
        drop: Vec<String>,
    }

    #[async_trait]
    impl InstructionFilter for DropFilter {
        async fn filter(&self, instruction: Instruction) -> Result<Option<Instruction>> {
            if self.drop.contains(&instruction.opcode) {
                Ok(None)
            } else {
                Ok(Some(instruction))
            }
        }
    }

    struct RenameFilter;

    #[async_trait]
    impl InstructionFilter for RenameFilter {
        async fn filter(&self, mut instruction: Instruction) -> Result<Option<Instruction>> {
            instruction.opcode = "renamed".to_string();
            Ok(Some(instruction))
        }
    }

    #[tokio::test]
    async fn test_drop_filter_removes_frames() {
        let filter = Arc::new(DropFilter {
            drop: vec!["select".to_string()],
        });
        let mut reader = FilteredReader::new(
            StaticReader::new(&["6.select,2.hi,5.hello,4.asdf;6.teston,2.hi,5.hello,4.asdf;"]),
            filter,
        );

        let result = reader.read_some().await.unwrap();
        assert_eq!(&result[..], b"6.teston,2.hi,5.hello,4.asdf;");
    }

    #[tokio::test]
    async fn test_fully_dropped_batch_reads_again() {
        let filter = Arc::new(DropFilter {
            drop: vec!["sync".to_string()],
        });
        let mut reader =
            FilteredReader::new(StaticReader::new(&["4.sync,8.12345678;", "3.img,1.1;"]), filter);

        let result = reader.read_some().await.unwrap();
        assert_eq!(&result[..], b"3.img,1.1;");
    }

    #[tokio::test]
    async fn test_rewrite_filter_reencodes() {
        let mut reader = FilteredReader::new(
            StaticReader::new(&["4.sync,8.12345678;"]),
            Arc::new(RenameFilter),
        );

        let result = reader.read_some().await.unwrap();
        assert_eq!(&result[..], b"7.renamed,8.12345678;");
    }

    #[tokio::test]
    async fn test_filters_compose_by_wrapping() {
        let inner = FilteredReader::new(
            StaticReader::new(&["6.select,3.vnc;4.sync,2.42;"]),
            Arc::new(DropFilter {
                drop: vec!["select".to_string()],
            }),
        );
        let mut outer = FilteredReader::new(Box::new(inner), Arc::new(RenameFilter));

        let result = outer.read_some().await.unwrap();
        assert_eq!(&result[..], b"7.renamed,2.42;");
    }
}
