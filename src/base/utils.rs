use std::fmt;

/// Helper struct that wraps a byte slice and improves its [`std::fmt::Debug`]
/// formatting. Printable ASCII characters are rendered as-is; non-printable
/// bytes are escaped as `\xNN`. Matches the formatting convention of the
/// [`bytes::Bytes`] type for consistency across logs.
///
/// # Examples
///
/// ```
/// # use squall::base::PrettyBytes;
/// assert_eq!(format!("{:?}", PrettyBytes(b"key1")), "b\"key1\"");
/// assert_eq!(format!("{:?}", PrettyBytes(b"\x00\xFF")), "b\"\\x00\\xff\"");
/// ```
pub struct PrettyBytes<'a>(pub &'a [u8]);

impl fmt::Debug for PrettyBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for &b in self.0 {
            match b {
                // human readable symbols, alphabet, etc
                b' '..b'~' => write!(f, "{}", b as char)?,
                // other bytes, like enter/backspace/newline
                _ => write!(f, "\\x{:02x}", b)?,
            }
        }
        write!(f, "\"")
    }
}
