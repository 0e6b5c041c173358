use crate::error::{DetectError, ErrorCode};
use std::cell::RefCell;
use std::ffi::{CString, c_char};

/// Longest message kept, in bytes, not counting the terminator.
const MAX_MESSAGE_LEN: usize = 511;

struct LastError {
    code: ErrorCode,
    message: CString,
}

thread_local! {
    static LAST_ERROR: RefCell<LastError> = RefCell::new(LastError {
        code: ErrorCode::Ok,
        message: CString::default(),
    });
}

pub fn clear() {
    LAST_ERROR.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.code = ErrorCode::Ok;
        slot.message = CString::default();
    });
}

pub fn set(code: ErrorCode, message: &str) {
    let message = to_c_message(message);
    LAST_ERROR.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.code = code;
        slot.message = message;
    });
}

pub fn set_error(err: &DetectError) {
    set(err.code(), &err.to_string());
}

pub fn code() -> ErrorCode {
    LAST_ERROR.with(|slot| slot.borrow().code)
}

pub fn message() -> String {
    LAST_ERROR.with(|slot| slot.borrow().message.to_string_lossy().into_owned())
}

/// Pointer to this thread's message. Valid until the next call into the library on the same
/// thread.
pub fn message_ptr() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().message.as_ptr())
}

fn to_c_message(message: &str) -> CString {
    let mut bytes: Vec<u8> = message.bytes().filter(|&b| b != 0).collect();
    if bytes.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        bytes = message.as_bytes()[..end].iter().copied().filter(|&b| b != 0).collect();
    }
    CString::new(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_clear() {
        set(ErrorCode::InvalidArgument, "bad width");
        assert_eq!(code(), ErrorCode::InvalidArgument);
        assert_eq!(message(), "bad width");
        clear();
        assert_eq!(code(), ErrorCode::Ok);
        assert_eq!(message(), "");
    }

    #[test]
    fn slot_is_per_thread() {
        set(ErrorCode::RuntimeFailure, "main thread");
        std::thread::spawn(|| {
            assert_eq!(code(), ErrorCode::Ok);
            set(ErrorCode::Unknown, "worker");
        })
        .join()
        .unwrap();
        assert_eq!(code(), ErrorCode::RuntimeFailure);
        assert_eq!(message(), "main thread");
    }

    #[test]
    fn long_and_nul_messages_are_sanitized() {
        set(ErrorCode::Unknown, "a\0b");
        assert_eq!(message(), "ab");
        let long = "é".repeat(400);
        set(ErrorCode::Unknown, &long);
        assert!(message().len() <= MAX_MESSAGE_LEN);
        assert!(message().chars().all(|c| c == 'é'));
    }
}
