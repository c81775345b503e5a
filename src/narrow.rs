//! Narrow String Encoding
//!
//! Converts between Rust strings and the platform's narrow C string bytes:
//! UTF-8 on Unix, the active ANSI code page on Windows. Characters the code
//! page cannot represent are replaced by its default character.

/// Encode `text` as narrow bytes, without a terminator
#[cfg(not(windows))]
pub fn encode(text: &str) -> Option<Vec<u8>> {
    Some(text.as_bytes().to_vec())
}

/// Decode narrow bytes returned by native code
#[cfg(not(windows))]
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Encode `text` as narrow bytes, without a terminator
#[cfg(windows)]
pub fn encode(text: &str) -> Option<Vec<u8>> {
    use std::ptr;
    use windows_sys::Win32::Globalization::{WideCharToMultiByte, CP_ACP};

    let wide: Vec<u16> = text.encode_utf16().collect();
    if wide.is_empty() {
        return Some(Vec::new());
    }
    let wide_len = i32::try_from(wide.len()).ok()?;

    // Safety: both buffers are valid for the lengths passed.
    unsafe {
        let needed = WideCharToMultiByte(
            CP_ACP,
            0,
            wide.as_ptr(),
            wide_len,
            ptr::null_mut(),
            0,
            ptr::null(),
            ptr::null_mut(),
        );
        if needed <= 0 {
            return None;
        }
        let mut bytes = vec![0u8; needed as usize];
        let written = WideCharToMultiByte(
            CP_ACP,
            0,
            wide.as_ptr(),
            wide_len,
            bytes.as_mut_ptr(),
            needed,
            ptr::null(),
            ptr::null_mut(),
        );
        if written <= 0 {
            return None;
        }
        bytes.truncate(written as usize);
        Some(bytes)
    }
}

/// Decode narrow bytes returned by native code
#[cfg(windows)]
pub fn decode(bytes: &[u8]) -> String {
    use std::ptr;
    use windows_sys::Win32::Globalization::{MultiByteToWideChar, CP_ACP};

    let Ok(len) = i32::try_from(bytes.len()) else {
        return String::from_utf8_lossy(bytes).into_owned();
    };
    if len == 0 {
        return String::new();
    }

    // Safety: both buffers are valid for the lengths passed.
    unsafe {
        let needed = MultiByteToWideChar(CP_ACP, 0, bytes.as_ptr(), len, ptr::null_mut(), 0);
        if needed <= 0 {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        let mut wide = vec![0u16; needed as usize];
        let written = MultiByteToWideChar(CP_ACP, 0, bytes.as_ptr(), len, wide.as_mut_ptr(), needed);
        wide.truncate(written.max(0) as usize);
        String::from_utf16_lossy(&wide)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_round_trip() {
        let bytes = encode("GetSystemMetrics 80").unwrap();
        assert_eq!(bytes, b"GetSystemMetrics 80");
        assert_eq!(decode(&bytes), "GetSystemMetrics 80");
    }

    #[test]
    fn test_empty() {
        assert_eq!(encode("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode(b""), "");
    }

    #[test]
    fn test_interior_nul_preserved() {
        assert_eq!(encode("a\0b").unwrap(), b"a\0b");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_unix_is_utf8() {
        assert_eq!(encode("héllo").unwrap(), "héllo".as_bytes());
        assert_eq!(decode("naïve".as_bytes()), "naïve");
    }

    #[cfg(windows)]
    #[test]
    fn test_windows_round_trip_through_code_page() {
        // Unmappable characters come back as the code page's default character
        let text = decode(&encode("caf\u{e9}").unwrap());
        assert!(text == "caf\u{e9}" || text == "caf?", "Unexpected text: {}", text);
    }
}
