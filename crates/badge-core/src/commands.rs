//! Simple single-exchange commands: ping, filesystem housekeeping, listings.

use tracing::{debug, warn};

use crate::events::BadgeObserver;
use crate::listing::{AppEntry, DirEntry, decode_apps, decode_directory};
use crate::protocol::Command;
use crate::session::{BadgeSession, SessionError};
use crate::transport::UsbTransport;

/// Path argument as sent on the wire: raw bytes plus a terminating NUL.
pub(crate) fn path_payload(path: &str) -> Vec<u8> {
    let mut payload = path.trim_end_matches('\0').as_bytes().to_vec();
    payload.push(0);
    payload
}

impl<T: UsbTransport, O: BadgeObserver> BadgeSession<T, O> {
    /// Echo test. True when the badge returns exactly what was sent.
    pub fn ping(&mut self, payload: &[u8]) -> Result<bool, SessionError> {
        let Some(response) = self.exchange(Command::PING, payload)? else {
            return Ok(false);
        };
        if response.payload != payload {
            let first_diff = payload
                .iter()
                .zip(&response.payload)
                .position(|(a, b)| a != b);
            warn!(
                sent = payload.len(),
                received = response.payload.len(),
                first_diff = ?first_diff,
                "Ping payload mismatch"
            );
            return Ok(false);
        }
        Ok(true)
    }

    pub fn file_exists(&mut self, path: &str) -> Result<bool, SessionError> {
        self.exchange_flag(Command::FS_EXISTS, &path_payload(path))
    }

    pub fn create_directory(&mut self, path: &str) -> Result<bool, SessionError> {
        self.exchange_flag(Command::FS_MKDIR, &path_payload(path))
    }

    /// Remove a file or an empty directory.
    pub fn remove(&mut self, path: &str) -> Result<bool, SessionError> {
        self.exchange_flag(Command::FS_REMOVE, &path_payload(path))
    }

    /// List one directory. `None` when it does not exist or the exchange
    /// failed; recursion is up to the caller.
    pub fn list_directory(&mut self, path: &str) -> Result<Option<Vec<DirEntry>>, SessionError> {
        let Some(response) = self.request(Command::FS_LIST, &path_payload(path))? else {
            warn!(path, "No response to FSLS");
            return Ok(None);
        };

        if response.command == Command::ERR_DIR_OPEN {
            debug!(path, "Directory does not exist");
            return Ok(None);
        }
        if response.command != Command::FS_LIST {
            warn!(got = %response.command, "Unexpected response to FSLS");
            return Ok(None);
        }

        match decode_directory(&response.payload) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                warn!(error = %e, path, "Malformed directory listing");
                Ok(None)
            }
        }
    }

    /// List installed AppFS applications.
    pub fn list_apps(&mut self) -> Result<Option<Vec<AppEntry>>, SessionError> {
        let Some(response) = self.exchange(Command::APP_LIST, &[])? else {
            return Ok(None);
        };
        match decode_apps(&response.payload) {
            Ok(apps) => Ok(Some(apps)),
            Err(e) => {
                warn!(error = %e, "Malformed app listing");
                Ok(None)
            }
        }
    }

    pub fn file_state(&mut self, _path: &str) -> Result<DirEntry, SessionError> {
        Err(SessionError::Unsupported("file state"))
    }

    pub fn app_read(&mut self, _name: &str) -> Result<Vec<u8>, SessionError> {
        Err(SessionError::Unsupported("AppFS read"))
    }

    pub fn app_write(
        &mut self,
        _name: &str,
        _title: &str,
        _version: u16,
        _data: &[u8],
    ) -> Result<bool, SessionError> {
        Err(SessionError::Unsupported("AppFS write"))
    }

    /// Start an installed app. The badge reboots into it on success.
    pub fn app_run(&mut self, _name: &str) -> Result<bool, SessionError> {
        Err(SessionError::Unsupported("AppFS run"))
    }

    pub fn app_remove(&mut self, _name: &str) -> Result<bool, SessionError> {
        Err(SessionError::Unsupported("AppFS remove"))
    }

    // TODO: decode NVSL records once the firmware settles on a layout.
    pub fn nvs_list(&mut self, _namespace: Option<&str>) -> Result<Vec<Vec<u8>>, SessionError> {
        Err(SessionError::Unsupported("NVS listing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::EntryKind;
    use crate::listing::tests::{app_record, dir_record};
    use crate::session::tests::test_session;

    #[test]
    fn test_path_payload() {
        assert_eq!(path_payload("/internal"), b"/internal\0");
        assert_eq!(path_payload("/sd\0"), b"/sd\0");
    }

    #[test]
    fn test_ping_echo() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::PING, b"hello");
        mock.queue_packet(Command::PING, b"hellx");

        assert!(session.ping(b"hello").unwrap());
        assert!(!session.ping(b"hello").unwrap());
    }

    #[test]
    fn test_flag_commands() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_EXISTS, &[1]);
        mock.queue_packet(Command::FS_MKDIR, &[0]);
        mock.queue_packet(Command::FS_REMOVE, &[1, 1]);

        assert!(session.file_exists("/internal/a").unwrap());
        assert!(!session.create_directory("/internal/b").unwrap());
        assert!(!session.remove("/internal/c").unwrap());

        let sent = mock.sent_packets();
        assert_eq!(sent[0].payload, b"/internal/a\0");
        assert_eq!(sent[1].command, Command::FS_MKDIR);
        assert_eq!(sent[2].command, Command::FS_REMOVE);
    }

    #[test]
    fn test_flag_command_without_reply() {
        let (_mock, mut session) = test_session();
        assert!(!session.file_exists("/internal/a").unwrap());
    }

    #[test]
    fn test_list_directory() {
        let (mock, mut session) = test_session();
        let mut payload = dir_record(2, b"apps", None);
        payload.extend(dir_record(1, b"boot.txt", Some((10, 20))));
        mock.queue_packet(Command::FS_LIST, &payload);

        let entries = session.list_directory("/internal").unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[1].name_lossy(), "boot.txt");
        assert_eq!(mock.sent_packets()[0].payload, b"/internal\0");
    }

    #[test]
    fn test_list_missing_directory() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::ERR_DIR_OPEN, &[]);
        assert!(session.list_directory("/internal/nope").unwrap().is_none());
    }

    #[test]
    fn test_list_directory_malformed() {
        let (mock, mut session) = test_session();
        mock.queue_packet(Command::FS_LIST, &[2, 9, 0, 0, 0, b'x']);
        assert!(session.list_directory("/internal").unwrap().is_none());
    }

    #[test]
    fn test_list_apps() {
        let (mock, mut session) = test_session();
        let mut payload = app_record(b"snake", b"Snake", 2, 4096);
        payload.extend(app_record(b"tetris", b"Tetris", 1, 8192));
        mock.queue_packet(Command::APP_LIST, &payload);

        let apps = session.list_apps().unwrap().unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].name_lossy(), "tetris");
        assert!(mock.sent_packets()[0].payload.is_empty());
    }

    #[test]
    fn test_unsupported_surfaces() {
        let (mock, mut session) = test_session();
        assert!(matches!(
            session.app_write("a", "A", 1, b""),
            Err(SessionError::Unsupported(_))
        ));
        assert!(matches!(
            session.nvs_list(Some("system")),
            Err(SessionError::Unsupported(_))
        ));
        assert!(matches!(
            session.file_state("/internal"),
            Err(SessionError::Unsupported(_))
        ));
        assert!(matches!(
            session.app_read("snake"),
            Err(SessionError::Unsupported(_))
        ));
        assert!(matches!(
            session.app_run("snake"),
            Err(SessionError::Unsupported("AppFS run"))
        ));
        assert!(matches!(
            session.app_remove("snake"),
            Err(SessionError::Unsupported("AppFS remove"))
        ));
        assert!(mock.get_writes().is_empty());
    }
}
