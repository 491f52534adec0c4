pub const ACCESSOR_PROGRAM: &str = "WindowsTimestampAccessor.exe";

#[derive(Debug, thiserror::Error)]
pub enum AccessorError {
    #[error("Failed to launch accessor '{program}': {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("Accessor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file path encoding: {0:?}")]
    PathEncoding(std::path::PathBuf),
    #[error("Unexpected accessor reply: {0:?}")]
    MalformedResponse(String),
    #[error("Accessor closed its output stream")]
    Disconnected,
    #[error("Accessor exited with {0}")]
    ChildExit(std::process::ExitStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    Creation,
    Modification,
    Access,
}

impl std::fmt::Display for TimestampKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TimestampKind::Creation => "Creation",
            TimestampKind::Modification => "Modification",
            TimestampKind::Access => "Access",
        })
    }
}

pub trait TimestampAccessor {
    fn get(
        &mut self,
        kind: TimestampKind,
        path: &std::path::Path,
    ) -> Result<crate::utils::windows::time::Ticks, AccessorError>;
    fn set(
        &mut self,
        kind: TimestampKind,
        path: &std::path::Path,
        ticks: crate::utils::windows::time::Ticks,
    ) -> Result<(), AccessorError>;
}

pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

impl<R: std::io::BufRead, W: std::io::Write> Channel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn get(
        &mut self,
        kind: TimestampKind,
        path: &str,
    ) -> Result<crate::utils::windows::time::Ticks, AccessorError> {
        let reply = self.exchange(&format!("Get{kind}Time\t{path}"))?;
        if let Some(("ok", raw)) = reply.split_once('\t') {
            if let Ok(ticks) = raw.parse() {
                return Ok(ticks);
            }
        }
        Err(AccessorError::MalformedResponse(reply))
    }

    pub fn set(
        &mut self,
        kind: TimestampKind,
        path: &str,
        ticks: crate::utils::windows::time::Ticks,
    ) -> Result<(), AccessorError> {
        let reply = self.exchange(&format!("Set{kind}Time\t{path}\t{ticks}"))?;
        if reply == "ok" {
            Ok(())
        } else {
            Err(AccessorError::MalformedResponse(reply))
        }
    }

    // One request line out, one reply line back, trailing CR/LF stripped.
    fn exchange(&mut self, request: &str) -> Result<String, AccessorError> {
        crate::log_trace!("accessor request: {:?}", request);
        self.writer.write_all(request.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(AccessorError::Disconnected);
        }
        while reply.ends_with('\n') || reply.ends_with('\r') {
            reply.pop();
        }

        crate::log_trace!("accessor reply: {:?}", reply);
        Ok(reply)
    }
}

pub struct AccessorProcess {
    child: std::process::Child,
    channel: Channel<std::io::BufReader<std::process::ChildStdout>, std::process::ChildStdin>,
}

impl AccessorProcess {
    // The helper lives next to the invocation directory, not on PATH.
    pub fn launch() -> Result<Self, AccessorError> {
        Self::launch_at(&std::path::Path::new(".").join(ACCESSOR_PROGRAM))
    }

    pub fn launch_at(program: &std::path::Path) -> Result<Self, AccessorError> {
        crate::log_debug!("launching accessor: {:?}", program);

        let mut child = std::process::Command::new(program)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|source| AccessorError::Launch {
                program: program.display().to_string(),
                source,
            })?;

        // Both ends were piped above, so the handles are present.
        let writer = child.stdin.take().ok_or(AccessorError::Disconnected)?;
        let reader = child.stdout.take().ok_or(AccessorError::Disconnected)?;

        Ok(Self {
            child,
            channel: Channel::new(std::io::BufReader::new(reader), writer),
        })
    }

    pub fn close(self) -> Result<(), AccessorError> {
        let Self { mut child, channel } = self;

        // Dropping the channel closes the child's stdin; EOF is its cue to exit.
        drop(channel);

        let status = child.wait()?;
        crate::log_debug!("accessor exited: {}", status);

        if status.success() {
            Ok(())
        } else {
            Err(AccessorError::ChildExit(status))
        }
    }
}

impl TimestampAccessor for AccessorProcess {
    fn get(
        &mut self,
        kind: TimestampKind,
        path: &std::path::Path,
    ) -> Result<crate::utils::windows::time::Ticks, AccessorError> {
        let path = wire_path(path)?;
        self.channel.get(kind, &path)
    }

    fn set(
        &mut self,
        kind: TimestampKind,
        path: &std::path::Path,
        ticks: crate::utils::windows::time::Ticks,
    ) -> Result<(), AccessorError> {
        let path = wire_path(path)?;
        self.channel.set(kind, &path, ticks)
    }
}

// The wire format carries absolute UTF-8 paths only.
fn wire_path(path: &std::path::Path) -> Result<String, AccessorError> {
    let absolute = std::path::absolute(path)?;
    match absolute.to_str() {
        Some(text) => Ok(text.to_owned()),
        None => Err(AccessorError::PathEncoding(absolute)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::windows::time::Ticks;

    #[test]
    fn get_sends_request_and_parses_reply() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(
            std::io::Cursor::new(&b"ok\t637134336000000000\n"[..]),
            &mut sent,
        );

        let ticks = channel
            .get(TimestampKind::Modification, "/tmp/report.txt")
            .unwrap();

        assert_eq!(ticks, Ticks::from(637_134_336_000_000_000));
        assert_eq!(sent, b"GetModificationTime\t/tmp/report.txt\n");
    }

    #[test]
    fn set_sends_request_and_accepts_bare_ok() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b"ok\n"[..]), &mut sent);

        channel
            .set(
                TimestampKind::Access,
                "/tmp/report.txt",
                Ticks::from(630_873_398_100_000_000),
            )
            .unwrap();

        assert_eq!(sent, b"SetAccessTime\t/tmp/report.txt\t630873398100000000\n");
    }

    #[test]
    fn failure_reply_is_a_protocol_error() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b"fail\tbad path\n"[..]), &mut sent);

        match channel.get(TimestampKind::Creation, "/tmp/missing") {
            Err(AccessorError::MalformedResponse(reply)) => assert_eq!(reply, "fail\tbad path"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn set_rejects_anything_but_ok() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b"fail\tdenied\n"[..]), &mut sent);

        match channel.set(TimestampKind::Modification, "/tmp/report.txt", Ticks::from(0)) {
            Err(AccessorError::MalformedResponse(reply)) => assert_eq!(reply, "fail\tdenied"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn get_rejects_non_numeric_ticks() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b"ok\tsoon\n"[..]), &mut sent);

        match channel.get(TimestampKind::Access, "/tmp/report.txt") {
            Err(AccessorError::MalformedResponse(reply)) => assert_eq!(reply, "ok\tsoon"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn reply_stripping_tolerates_crlf() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b"ok\t10\r\n"[..]), &mut sent);

        let ticks = channel.get(TimestampKind::Access, "/tmp/report.txt").unwrap();
        assert_eq!(ticks, Ticks::from(10));
    }

    #[test]
    fn closed_stream_is_reported_as_disconnected() {
        let mut sent = Vec::new();
        let mut channel = Channel::new(std::io::Cursor::new(&b""[..]), &mut sent);

        match channel.get(TimestampKind::Access, "/tmp/report.txt") {
            Err(AccessorError::Disconnected) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    mod live {
        use super::*;

        fn stub_accessor(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
            use std::os::unix::fs::PermissionsExt;

            let path = dir.join("accessor-stub");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();

            let mut permissions = std::fs::metadata(&path).unwrap().permissions();
            permissions.set_mode(0o755);
            std::fs::set_permissions(&path, permissions).unwrap();
            path
        }

        #[test]
        fn talks_to_a_live_child_and_closes_cleanly() {
            let dir = tempfile::tempdir().unwrap();
            let stub = stub_accessor(
                dir.path(),
                "while IFS= read -r request; do printf 'ok\\t621355968000000000\\n'; done",
            );

            let mut accessor = AccessorProcess::launch_at(&stub).unwrap();
            let ticks = accessor
                .get(TimestampKind::Access, std::path::Path::new("/tmp/anything"))
                .unwrap();

            assert_eq!(
                ticks,
                Ticks::from(crate::utils::windows::time::EPOCH_TICKS)
            );
            accessor.close().unwrap();
        }

        #[test]
        fn close_surfaces_child_exit_status() {
            let dir = tempfile::tempdir().unwrap();
            let stub = stub_accessor(
                dir.path(),
                "while IFS= read -r request; do printf 'ok\\n'; done\nexit 3",
            );

            let accessor = AccessorProcess::launch_at(&stub).unwrap();
            match accessor.close() {
                Err(AccessorError::ChildExit(status)) => assert_eq!(status.code(), Some(3)),
                Err(other) => panic!("unexpected error: {}", other),
                Ok(()) => panic!("close unexpectedly succeeded"),
            }
        }

        #[test]
        fn child_dying_mid_conversation_is_disconnected() {
            let dir = tempfile::tempdir().unwrap();
            let stub = stub_accessor(dir.path(), "read -r request\nexit 0");

            let mut accessor = AccessorProcess::launch_at(&stub).unwrap();
            match accessor.get(TimestampKind::Modification, std::path::Path::new("/tmp/x")) {
                Err(AccessorError::Disconnected) => {}
                other => panic!("unexpected result: {:?}", other),
            }

            // The child is already gone; close still reaps it.
            accessor.close().unwrap();
        }

        #[test]
        fn launch_failure_names_the_program() {
            let dir = tempfile::tempdir().unwrap();
            let missing = dir.path().join("no-such-accessor");

            match AccessorProcess::launch_at(&missing) {
                Err(AccessorError::Launch { program, .. }) => {
                    assert!(program.ends_with("no-such-accessor"))
                }
                Err(other) => panic!("unexpected error: {}", other),
                Ok(_) => panic!("launch unexpectedly succeeded"),
            }
        }
    }
}
