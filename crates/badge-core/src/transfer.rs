//! Chunked file transfer.
//!
//! `FSFW`/`FSFR` open a file on the badge, a run of `CHNK` exchanges moves
//! the data and `FSFC` closes it. Only one file can be open at a time; the
//! badge tracks that, not us.

use std::io::{ErrorKind, Read};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{info, instrument, warn};

use crate::commands::path_payload;
use crate::events::{BadgeEvent, BadgeObserver};
use crate::protocol::Command;
use crate::session::{BadgeSession, SessionError};
use crate::transport::UsbTransport;

/// Fill `buf` from `source` until it is full or the source is exhausted.
fn fill_chunk<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<T: UsbTransport, O: BadgeObserver> BadgeSession<T, O> {
    /// Write everything `source` yields to `path` on the badge.
    pub fn file_write<R: Read>(&mut self, path: &str, mut source: R) -> Result<bool, SessionError> {
        self.write_from(path, &mut source, 0)
    }

    /// Write an in-memory buffer to `path` on the badge.
    pub fn file_write_all(&mut self, path: &str, data: &[u8]) -> Result<bool, SessionError> {
        let mut source = data;
        self.write_from(path, &mut source, data.len() as u64)
    }

    #[instrument(skip(self, source))]
    fn write_from(
        &mut self,
        path: &str,
        source: &mut dyn Read,
        total: u64,
    ) -> Result<bool, SessionError> {
        if !self.open_file(Command::FS_FILE_WRITE, path)? {
            return Ok(false);
        }

        let mut buf = vec![0u8; self.config().chunk_size()];
        let mut position = 0u64;

        let outcome = loop {
            let len = match fill_chunk(source, &mut buf) {
                Ok(0) => break Ok(true),
                Ok(len) => len,
                Err(e) => break Err(SessionError::Io(e)),
            };

            match self.write_chunk(&buf[..len]) {
                Ok(Some(accepted)) if accepted as usize == len => {
                    position += len as u64;
                    self.emit(BadgeEvent::Progress {
                        operation: format!("write {}", path),
                        current: position,
                        total,
                    });
                }
                Ok(accepted) => {
                    warn!(accepted = ?accepted, expected = len, "Failed to send data");
                    break Ok(false);
                }
                Err(e) => break Err(e),
            }
        };

        let closed = self.close_file();
        let written = outcome?;
        if !closed? {
            warn!(path, "Badge did not confirm close");
        }
        if written {
            info!(path, bytes = position, "File written");
        }
        Ok(written)
    }

    /// Read `path` from the badge. `None` if it could not be opened or the
    /// transfer broke off; partial data is not returned.
    #[instrument(skip(self))]
    pub fn file_read(&mut self, path: &str) -> Result<Option<Vec<u8>>, SessionError> {
        if !self.open_file(Command::FS_FILE_READ, path)? {
            return Ok(None);
        }

        let mut data = Vec::new();
        let outcome = loop {
            match self.read_chunk() {
                Ok(Some(chunk)) if chunk.is_empty() => break Ok(true),
                Ok(Some(chunk)) => {
                    data.extend_from_slice(&chunk);
                    self.emit(BadgeEvent::Progress {
                        operation: format!("read {}", path),
                        current: data.len() as u64,
                        total: 0,
                    });
                }
                Ok(None) => {
                    warn!(path, received = data.len(), "Read error");
                    break Ok(false);
                }
                Err(e) => break Err(e),
            }
        };

        let closed = self.close_file();
        let complete = outcome?;
        if !closed? {
            warn!(path, "Badge did not confirm close");
        }
        if !complete {
            return Ok(None);
        }
        info!(path, bytes = data.len(), "File read");
        Ok(Some(data))
    }

    /// Open for reading or writing; the first reply byte says whether it worked.
    fn open_file(&mut self, command: Command, path: &str) -> Result<bool, SessionError> {
        let Some(response) = self.exchange(command, &path_payload(path))? else {
            return Ok(false);
        };
        match response.payload.first() {
            Some(&opened) if opened != 0 => Ok(true),
            _ => {
                warn!(path, "Failed to open file");
                Ok(false)
            }
        }
    }

    /// Send one data chunk, returning how many bytes the badge accepted.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<Option<u32>, SessionError> {
        let Some(response) = self.exchange(Command::CHUNK, data)? else {
            return Ok(None);
        };
        if response.payload.len() != 4 {
            warn!(len = response.payload.len(), "Wrong CHNK acknowledge length");
            return Ok(None);
        }
        Ok(Some(LittleEndian::read_u32(&response.payload)))
    }

    /// Fetch the next chunk of the open file; empty means end of file.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        Ok(self
            .exchange(Command::CHUNK, &[])?
            .map(|response| response.payload))
    }

    /// Close the open file.
    pub fn close_file(&mut self) -> Result<bool, SessionError> {
        self.exchange_flag(Command::FS_FILE_CLOSE, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CHUNK_SIZE;
    use crate::session::tests::test_session;
    use crate::transport::MockTransport;

    fn accept(mock: &MockTransport, len: usize) {
        mock.queue_packet(Command::CHUNK, &(len as u32).to_le_bytes());
    }

    fn chunk_lengths(mock: &MockTransport) -> Vec<usize> {
        mock.sent_packets()
            .iter()
            .filter(|p| p.command == Command::CHUNK)
            .map(|p| p.payload.len())
            .collect()
    }

    fn count(mock: &MockTransport, command: Command) -> usize {
        mock.sent_commands().iter().filter(|c| **c == command).count()
    }

    #[test]
    fn test_write_exact_chunk() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        accept(&mock, CHUNK_SIZE);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        let data = vec![0x5A; CHUNK_SIZE];
        assert!(session.file_write("/internal/a.bin", &data[..]).unwrap());
        assert_eq!(chunk_lengths(&mock), vec![CHUNK_SIZE]);
        assert_eq!(
            mock.sent_commands(),
            vec![Command::FS_FILE_WRITE, Command::CHUNK, Command::FS_FILE_CLOSE]
        );
        assert_eq!(mock.sent_packets()[0].payload, b"/internal/a.bin\0");
    }

    #[test]
    fn test_write_chunk_plus_one() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        accept(&mock, CHUNK_SIZE);
        accept(&mock, 1);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        let data: Vec<u8> = (0..CHUNK_SIZE + 1).map(|i| i as u8).collect();
        assert!(session.file_write_all("/internal/b.bin", &data).unwrap());
        assert_eq!(chunk_lengths(&mock), vec![CHUNK_SIZE, 1]);

        let sent: Vec<u8> = mock
            .sent_packets()
            .into_iter()
            .filter(|p| p.command == Command::CHUNK)
            .flat_map(|p| p.payload)
            .collect();
        assert_eq!(sent, data);
    }

    #[test]
    fn test_write_empty_source() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        assert!(session.file_write_all("/internal/empty", &[]).unwrap());
        assert_eq!(
            mock.sent_commands(),
            vec![Command::FS_FILE_WRITE, Command::FS_FILE_CLOSE]
        );
    }

    #[test]
    fn test_write_short_accept_aborts() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        accept(&mock, 100);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        let data = vec![0u8; CHUNK_SIZE * 3];
        assert!(!session.file_write_all("/internal/c.bin", &data).unwrap());
        assert_eq!(count(&mock, Command::CHUNK), 1);
        assert_eq!(count(&mock, Command::FS_FILE_CLOSE), 1);
    }

    #[test]
    fn test_write_missing_ack_aborts() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        mock.queue_silence();
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        assert!(!session.file_write_all("/internal/d.bin", &[1, 2, 3]).unwrap());
        assert_eq!(count(&mock, Command::FS_FILE_CLOSE), 1);
    }

    #[test]
    fn test_write_open_refused() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[0]);

        assert!(!session.file_write_all("/internal/ro", &[1]).unwrap());
        assert_eq!(mock.sent_commands(), vec![Command::FS_FILE_WRITE]);
    }

    #[test]
    fn test_write_source_error_still_closes() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
        }

        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_WRITE, &[1]);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        assert!(matches!(
            session.file_write("/internal/e", Broken),
            Err(SessionError::Io(_))
        ));
        assert_eq!(
            mock.sent_commands(),
            vec![Command::FS_FILE_WRITE, Command::FS_FILE_CLOSE]
        );
    }

    #[test]
    fn test_read_three_chunks() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_READ, &[1]);
        mock.queue_packet(Command::CHUNK, &[1u8; 500]);
        mock.queue_packet(Command::CHUNK, &[2u8; 8192]);
        mock.queue_packet(Command::CHUNK, &[3u8; 7]);
        mock.queue_packet(Command::CHUNK, &[]);
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        let data = session.file_read("/internal/big").unwrap().unwrap();
        let mut expected = vec![1u8; 500];
        expected.extend(vec![2u8; 8192]);
        expected.extend(vec![3u8; 7]);
        assert_eq!(data, expected);

        assert_eq!(count(&mock, Command::CHUNK), 4);
        assert_eq!(count(&mock, Command::FS_FILE_CLOSE), 1);
        assert!(chunk_lengths(&mock).iter().all(|&len| len == 0));
    }

    #[test]
    fn test_read_broken_transfer() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_READ, &[1]);
        mock.queue_packet(Command::CHUNK, b"partial");
        mock.queue_silence();
        mock.queue_packet(Command::FS_FILE_CLOSE, &[1]);

        assert!(session.file_read("/internal/x").unwrap().is_none());
        assert_eq!(count(&mock, Command::FS_FILE_CLOSE), 1);
    }

    #[test]
    fn test_read_open_refused() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_FILE_READ, &[0]);

        assert!(session.file_read("/internal/none").unwrap().is_none());
        assert_eq!(mock.sent_commands(), vec![Command::FS_FILE_READ]);
    }
}
