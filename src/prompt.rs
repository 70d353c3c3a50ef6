//! Interactive prompts for a missing bucket or credentials
//!
//! Everything is written to stderr so stdout stays clean for the run summary.
//! Secrets are read with terminal echo switched off on unix. Other platforms
//! have no echo control here, so the label says the input will be visible.

use std::io::{self, BufRead, IsTerminal, Write};

/// True when stdin is attached to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Ask for a value and read one line with echo
pub fn prompt(label: &str) -> io::Result<String> {
    ask(label)?;
    read_line()
}

/// Ask for a secret and read one line with echo off
pub fn prompt_hidden(label: &str) -> io::Result<String> {
    ask(&hidden_label(label))?;

    let echo = echo::EchoOff::stdin()?;
    let line = read_line();
    drop(echo);
    line
}

fn ask(label: &str) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    stderr.write_all(label.as_bytes())?;
    stderr.flush()
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(trim_newline(line))
}

fn trim_newline(mut line: String) -> String {
    let kept = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(kept);
    line
}

#[cfg(unix)]
fn hidden_label(label: &str) -> String {
    label.to_string()
}

#[cfg(not(unix))]
fn hidden_label(label: &str) -> String {
    format!("(input will be visible) {label}")
}

#[cfg(unix)]
mod echo {
    use std::io::{self, IsTerminal};
    use std::mem::MaybeUninit;
    use std::os::fd::{AsRawFd, RawFd};

    /// Terminal echo switched off until dropped
    ///
    /// `ECHONL` stays on so the newline that ends the secret still moves the
    /// cursor. The saved attributes are put back on drop, including when the
    /// read in between fails.
    pub struct EchoOff {
        fd: RawFd,
        saved: libc::termios,
    }

    impl EchoOff {
        /// Disable echo on stdin; `None` when stdin is not a terminal
        pub fn stdin() -> io::Result<Option<Self>> {
            let stdin = io::stdin();
            if !stdin.is_terminal() {
                return Ok(None);
            }
            Self::on(stdin.as_raw_fd()).map(Some)
        }

        pub fn on(fd: RawFd) -> io::Result<Self> {
            let mut attrs = MaybeUninit::<libc::termios>::uninit();
            // SAFETY: tcgetattr fills `attrs` completely when it returns 0.
            let saved = unsafe {
                if libc::tcgetattr(fd, attrs.as_mut_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                attrs.assume_init()
            };

            let mut quiet = saved;
            quiet.c_lflag &= !libc::ECHO;
            quiet.c_lflag |= libc::ECHONL;
            // SAFETY: `quiet` is a valid termios copied from the terminal.
            if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &quiet) } != 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(Self { fd, saved })
        }
    }

    impl Drop for EchoOff {
        fn drop(&mut self) {
            // SAFETY: `saved` came from tcgetattr on the same fd.
            let rc = unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.saved) };
            if rc != 0 {
                tracing::warn!(
                    error = %io::Error::last_os_error(),
                    "Failed to restore terminal echo"
                );
            }
        }
    }
}

#[cfg(not(unix))]
mod echo {
    use std::io;

    pub struct EchoOff;

    impl EchoOff {
        pub fn stdin() -> io::Result<Option<Self>> {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_newline() {
        assert_eq!(trim_newline("secret\n".into()), "secret");
        assert_eq!(trim_newline("secret\r\n".into()), "secret");
        assert_eq!(trim_newline("se cret".into()), "se cret");
        assert_eq!(trim_newline("trailing \n\n".into()), "trailing ");
        assert_eq!(trim_newline(String::new()), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_hidden_label_is_unchanged_where_echo_can_be_disabled() {
        assert_eq!(hidden_label("Secret key: "), "Secret key: ");
    }

    #[cfg(not(unix))]
    #[test]
    fn test_hidden_label_warns_that_input_is_visible() {
        let label = hidden_label("Secret key: ");
        assert!(label.contains("visible"));
        assert!(label.ends_with("Secret key: "));
    }

    #[cfg(unix)]
    #[test]
    fn test_echo_off_refuses_non_terminal() {
        use std::os::fd::AsRawFd;

        let file = tempfile::tempfile().unwrap();
        let err = match echo::EchoOff::on(file.as_raw_fd()) {
            Ok(_) => panic!("a regular file has no terminal attributes"),
            Err(e) => e,
        };
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }
}
