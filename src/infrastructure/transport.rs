use crate::domain::dispatch::{Message, TransportError};
use crate::domain::participant::is_valid_email;
use crate::domain::ports::Transport;
use async_trait::async_trait;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

fn check_address(message: &Message) -> Result<(), TransportError> {
    if is_valid_email(&message.to) {
        Ok(())
    } else {
        Err(TransportError::permanent(format!(
            "invalid recipient address `{}`",
            message.to
        )))
    }
}

/// Maps an I/O failure to a transport error class.
///
/// Permission problems will not go away by themselves; everything else is
/// treated as worth another attempt.
pub fn classify_io_error(error: &io::Error) -> TransportError {
    match error.kind() {
        ErrorKind::PermissionDenied | ErrorKind::InvalidInput | ErrorKind::Unsupported => {
            TransportError::permanent(error.to_string())
        }
        _ => TransportError::transient(error.to_string()),
    }
}

/// Delivers messages by dropping one JSON file per recipient into a directory
/// that a mail relay or a person can pick up from.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    /// Uses `dir` as the outbox, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the file a message to `address` is written to.
    ///
    /// Bytes outside `[A-Za-z0-9@._-]` are percent-encoded, so the name is
    /// safe on any filesystem and distinct addresses never share a file.
    pub fn path_for(&self, address: &str) -> PathBuf {
        let mut stem = String::with_capacity(address.len());
        for byte in address.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'@' | b'.' | b'-' | b'_') {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{stem}.json"))
    }

    fn write(dir: &Path, target: &Path, message: &Message) -> io::Result<()> {
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, message)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl Transport for OutboxTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        check_address(message)?;

        let dir = self.dir.clone();
        let target = self.path_for(&message.to);
        let owned = message.clone();
        tokio::task::spawn_blocking(move || Self::write(&dir, &target, &owned))
            .await
            .map_err(|e| TransportError::transient(format!("outbox writer failed: {e}")))?
            .map_err(|e| classify_io_error(&e))?;

        info!(to = %message.to, "notification written to outbox");
        Ok(())
    }
}

/// Dry-run transport: logs what would be sent and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        check_address(message)?;
        info!(to = %message.to, subject = %message.subject, "dry run: notification not sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatch::TransportErrorKind;

    fn message(to: &str) -> Message {
        Message {
            to: to.to_string(),
            subject: "Your Secret Santa pairing".to_string(),
            body: "Hello,\n\nYou are the Secret Santa for Ben!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_outbox_writes_one_file_per_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxTransport::open(dir.path().join("outbox")).unwrap();

        outbox.send(&message("ana@example.com")).await.unwrap();
        outbox.send(&message("ben@example.com")).await.unwrap();

        let written: Message = serde_json::from_slice(
            &std::fs::read(outbox.path_for("ana@example.com")).unwrap(),
        )
        .unwrap();
        assert_eq!(written, message("ana@example.com"));
        assert_eq!(std::fs::read_dir(dir.path().join("outbox")).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_address_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxTransport::open(dir.path()).unwrap();

        let error = outbox.send(&message("not-an-address")).await.unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::Permanent);

        let error = LogTransport.send(&message("still not")).await.unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::Permanent);
    }

    #[test]
    fn test_io_error_classification() {
        let denied = io::Error::new(ErrorKind::PermissionDenied, "nope");
        assert!(!classify_io_error(&denied).is_transient());

        let timeout = io::Error::new(ErrorKind::TimedOut, "slow disk");
        assert!(classify_io_error(&timeout).is_transient());
    }

    #[test]
    fn test_path_for_encodes_address() {
        let outbox = OutboxTransport { dir: PathBuf::from("/tmp/outbox") };
        assert_eq!(
            outbox.path_for("a/../b@x.io"),
            PathBuf::from("/tmp/outbox/a%2F..%2Fb@x.io.json")
        );
        assert_eq!(
            outbox.path_for("ana.pop@example.com"),
            PathBuf::from("/tmp/outbox/ana.pop@example.com.json")
        );
    }

    #[tokio::test]
    async fn test_similar_addresses_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxTransport::open(dir.path()).unwrap();
        let mut plus = message("a+b@x.io");
        plus.body = "You are the Secret Santa for Cleo!".to_string();
        let underscore = message("a_b@x.io");

        outbox.send(&plus).await.unwrap();
        outbox.send(&underscore).await.unwrap();

        assert_ne!(outbox.path_for("a+b@x.io"), outbox.path_for("a_b@x.io"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        for sent in [plus, underscore] {
            let written: Message =
                serde_json::from_slice(&std::fs::read(outbox.path_for(&sent.to)).unwrap())
                    .unwrap();
            assert_eq!(written, sent);
        }
    }
}
