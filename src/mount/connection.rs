use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::MountError;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK: usize = 256;

/// Byte stream the mount controller is reached through.
pub trait Transport: Read + Write + Send {
    /// Closes the sending half of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Write)
    }
}

/// Request/response access to the mount controller.
pub trait MountLink: Send + Sync {
    /// Sends `command` and returns the raw reply, reading at most
    /// `max_reply` bytes. No reply is read when `max_reply` is zero.
    fn send_and_receive(&self, command: &str, max_reply: usize) -> Result<String, MountError>;

    fn terminate(&self) -> Result<(), MountError>;
}

impl<L: MountLink + ?Sized> MountLink for Arc<L> {
    fn send_and_receive(&self, command: &str, max_reply: usize) -> Result<String, MountError> {
        (**self).send_and_receive(command, max_reply)
    }

    fn terminate(&self) -> Result<(), MountError> {
        (**self).terminate()
    }
}

/// A single persistent connection shared by every caller. Each exchange holds
/// the lock for the full write/read cycle.
pub struct MountConnection<T: Transport> {
    stream: Mutex<Option<T>>,
}

impl MountConnection<TcpStream> {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, MountError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<T: Transport> MountConnection<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl<T: Transport> MountLink for MountConnection<T> {
    fn send_and_receive(&self, command: &str, max_reply: usize) -> Result<String, MountError> {
        let mut guard = self.stream.lock().unwrap();
        let stream = guard.as_mut().ok_or(MountError::Terminated)?;

        stream.write_all(format!("{}\r", command).as_bytes())?;
        stream.flush()?;
        if max_reply == 0 {
            return Ok(String::new());
        }

        let mut reply = Vec::new();
        let mut chunk = [0u8; CHUNK];
        while reply.len() < max_reply {
            let want = CHUNK.min(max_reply - reply.len());
            let n = stream.read(&mut chunk[..want])?;
            if n == 0 {
                if reply.is_empty() {
                    return Err(MountError::Io(io::ErrorKind::UnexpectedEof.into()));
                }
                break;
            }
            reply.extend_from_slice(&chunk[..n]);
            // replies end with ':' on success and '?' on error
            if matches!(reply.last(), Some(b':') | Some(b'?')) {
                break;
            }
        }

        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    fn terminate(&self) -> Result<(), MountError> {
        let mut guard = self.stream.lock().unwrap();
        if let Some(mut stream) = guard.take() {
            stream.shutdown()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::thread;

    #[derive(Default)]
    struct Scripted {
        written: Arc<Mutex<Vec<u8>>>,
        replies: VecDeque<Vec<u8>>,
        shutdowns: Arc<Mutex<usize>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Scripted {
        fn shutdown(&mut self) -> io::Result<()> {
            *self.shutdowns.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Replies to every command with the command itself.
    #[derive(Default)]
    struct Echo {
        pending: Vec<u8>,
        reply: VecDeque<u8>,
    }

    impl Read for Echo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // hand out one byte at a time to widen any race window
            thread::yield_now();
            match self.reply.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for Echo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            if self.pending.last() == Some(&b'\r') {
                let cmd = std::mem::take(&mut self.pending);
                self.reply.extend(b" ");
                self.reply.extend(&cmd[..cmd.len() - 1]);
                self.reply.extend(b"\r\n:");
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Echo {
        fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn assembles_reply_from_chunks() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let stream = Scripted {
            written: written.clone(),
            replies: VecDeque::from(vec![b" 1.0000\r\n".to_vec(), b":".to_vec()]),
            ..Default::default()
        };
        let conn = MountConnection::new(stream);

        let reply = conn.send_and_receive("MG knowpos", 1024).unwrap();
        assert_eq!(reply, " 1.0000\r\n:");
        assert_eq!(written.lock().unwrap().as_slice(), b"MG knowpos\r");
    }

    #[test]
    fn zero_reply_bytes_skips_read() {
        let conn = MountConnection::new(Scripted::default());
        assert_eq!(conn.send_and_receive("SB9", 0).unwrap(), "");
    }

    #[test]
    fn closed_stream_is_an_error() {
        let conn = MountConnection::new(Scripted::default());
        assert!(matches!(
            conn.send_and_receive("MG c_az", 64),
            Err(MountError::Io(_))
        ));
    }

    #[test]
    fn terminate_shuts_down_once() {
        let shutdowns = Arc::new(Mutex::new(0));
        let conn = MountConnection::new(Scripted {
            shutdowns: shutdowns.clone(),
            ..Default::default()
        });

        conn.terminate().unwrap();
        conn.terminate().unwrap();
        assert_eq!(*shutdowns.lock().unwrap(), 1);
        assert!(matches!(
            conn.send_and_receive("MG c_az", 64),
            Err(MountError::Terminated)
        ));
    }

    #[test]
    fn concurrent_callers_never_interleave() {
        let conn = Arc::new(MountConnection::new(Echo::default()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let conn = conn.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        let cmd = format!("MG var_{}_{}", i, j);
                        let reply = conn.send_and_receive(&cmd, 1024).unwrap();
                        assert_eq!(reply, format!(" {}\r\n:", cmd));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
