//! Byte-at-a-time line editing on a terminal in non-canonical mode.
//!
//! The reader echoes printable bytes itself, handles backspace, recalls the
//! previous line on Up-arrow and turns Tab into a completion request by
//! ending the line with a `?` marker.

use crate::error::InputError;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

const CTRL_D: u8 = 4;
const BACKSPACE: u8 = 8;
const TAB: u8 = b'\t';
const ESC: u8 = 27;
const DEL: u8 = 127;

/// Marker appended to a line ended by Tab.
pub const COMPLETION_MARKER: char = '?';

/// One result of [`LineReader::read_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A line without its terminator. Ends with [`COMPLETION_MARKER`] when Tab ended it.
    Line(String),
    /// End of input or Ctrl-D.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    Ground,
    /// Saw ESC.
    Start,
    /// Saw ESC `[`; `params` tells whether parameter bytes followed.
    Csi { params: bool },
}

/// Line editor with a one-entry history.
#[derive(Debug)]
pub struct LineReader {
    history: Option<String>,
    max_len: usize,
}

impl LineReader {
    pub fn new(max_len: usize) -> Self {
        Self {
            history: None,
            max_len,
        }
    }

    /// The most recently submitted line, without the completion marker.
    pub fn last_line(&self) -> Option<&str> {
        self.history.as_deref()
    }

    /// Read one line from the process's standard input.
    ///
    /// When stdin is a terminal it is switched to non-canonical, no-echo mode
    /// for the duration of the call and the reader echoes to stdout. Otherwise
    /// bytes are consumed as they come and nothing is echoed.
    pub fn read_from_terminal(&mut self, initial: &str) -> Result<Input, InputError> {
        let stdin = io::stdin();
        let raw = RawMode::enable(stdin.as_raw_fd())?;
        let mut input = stdin.lock();
        match raw {
            Some(_) => self.read_line(&mut input, &mut io::stdout(), initial),
            None => self.read_line(&mut input, &mut io::sink(), initial),
        }
    }

    /// Read one line from `input`, echoing edits to `echo`.
    ///
    /// The buffer starts out as `initial`, which is echoed first.
    pub fn read_line<R: Read, W: Write>(
        &mut self,
        input: &mut R,
        echo: &mut W,
        initial: &str,
    ) -> Result<Input, InputError> {
        let mut buf: Vec<u8> = initial.as_bytes().to_vec();
        if buf.len() > self.max_len {
            return Err(InputError::LineTooLong {
                limit: self.max_len,
            });
        }
        echo.write_all(&buf)?;
        echo.flush()?;

        let mut state = Escape::Ground;
        loop {
            let Some(byte) = read_byte(input)? else {
                return Ok(Input::Eof);
            };

            match state {
                Escape::Ground => {}
                Escape::Start => {
                    state = Escape::Ground;
                    if byte == b'[' {
                        state = Escape::Csi { params: false };
                        continue;
                    }
                }
                Escape::Csi { params } => {
                    if (0x30..=0x3f).contains(&byte) {
                        state = Escape::Csi { params: true };
                    } else if (0x20..=0x2f).contains(&byte) {
                        // intermediate bytes; keep scanning for the final one
                    } else {
                        state = Escape::Ground;
                        if byte == b'A' && !params {
                            self.recall(&mut buf, echo)?;
                        }
                    }
                    continue;
                }
            }

            match byte {
                ESC => state = Escape::Start,
                b'\n' | b'\r' => {
                    echo.write_all(b"\n")?;
                    echo.flush()?;
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    self.history = Some(line.clone());
                    return Ok(Input::Line(line));
                }
                TAB => {
                    echo.write_all(b"\n")?;
                    echo.flush()?;
                    let mut line = String::from_utf8_lossy(&buf).into_owned();
                    self.history = Some(line.clone());
                    line.push(COMPLETION_MARKER);
                    return Ok(Input::Line(line));
                }
                CTRL_D => return Ok(Input::Eof),
                DEL | BACKSPACE => {
                    if erase_last_char(&mut buf) {
                        echo.write_all(b"\x08 \x08")?;
                        echo.flush()?;
                    }
                }
                b if b < 0x20 => {}
                b => {
                    if buf.len() >= self.max_len {
                        discard_rest_of_line(input)?;
                        echo.write_all(b"\n")?;
                        echo.flush()?;
                        return Err(InputError::LineTooLong {
                            limit: self.max_len,
                        });
                    }
                    buf.push(b);
                    echo.write_all(&[b])?;
                    echo.flush()?;
                }
            }
        }
    }

    /// Replace the buffer, on screen too, with the previous line.
    fn recall<W: Write>(&self, buf: &mut Vec<u8>, echo: &mut W) -> io::Result<()> {
        let shown = String::from_utf8_lossy(buf).chars().count();
        for _ in 0..shown {
            echo.write_all(b"\x08 \x08")?;
        }
        buf.clear();
        if let Some(previous) = &self.history {
            buf.extend_from_slice(previous.as_bytes());
        }
        echo.write_all(buf)?;
        echo.flush()
    }
}

fn read_byte<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Consume input through the end of the current line so its tail isn't read as the next one.
fn discard_rest_of_line<R: Read>(input: &mut R) -> io::Result<()> {
    while let Some(byte) = read_byte(input)? {
        if matches!(byte, b'\n' | b'\r' | CTRL_D) {
            break;
        }
    }
    Ok(())
}

/// Drop the last UTF-8 character of `buf`. Returns false when it was empty.
fn erase_last_char(buf: &mut Vec<u8>) -> bool {
    if buf.is_empty() {
        return false;
    }
    while let Some(b) = buf.pop() {
        if b & 0xc0 != 0x80 {
            break;
        }
    }
    true
}

/// Terminal attributes saved on entry to non-canonical mode and restored on drop.
struct RawMode {
    fd: RawFd,
    saved: libc::termios,
}

impl RawMode {
    /// Switch `fd` to non-canonical, no-echo mode. Returns `None` if it isn't a terminal.
    fn enable(fd: RawFd) -> io::Result<Option<Self>> {
        if unsafe { libc::isatty(fd) } != 1 {
            return Ok(None);
        }

        let mut saved = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Some(RawMode { fd, saved }))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}
