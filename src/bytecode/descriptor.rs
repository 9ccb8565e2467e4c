//! Field and method descriptor sizing (JVMS 4.3)

/// Slot sizes derived from a method descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodShape {
    /// Slots taken by the declared parameters, excluding `this`
    pub parameter_slots: u16,
    /// Slots pushed by the return value, 0 for `void`
    pub return_slots: u16,
}

/// Parse one field type starting at `at`, returning its slot size and the
/// position right after it
fn field_type(bytes: &[u8], at: usize) -> Option<(u16, usize)> {
    match *bytes.get(at)? {
        b'B' | b'C' | b'F' | b'I' | b'S' | b'Z' => Some((1, at + 1)),
        b'J' | b'D' => Some((2, at + 1)),
        b'L' => {
            let end = bytes[at..].iter().position(|b| *b == b';')?;
            Some((1, at + end + 1))
        }
        b'[' => {
            let mut cursor = at;
            while bytes.get(cursor) == Some(&b'[') {
                cursor += 1;
            }
            let (_, next) = field_type(bytes, cursor)?;
            Some((1, next))
        }
        _ => None,
    }
}

/// Slot size of a field descriptor such as `I`, `J` or `Ljava/lang/String;`
pub fn field_slots(descriptor: &str) -> Option<u16> {
    let bytes = descriptor.as_bytes();
    match field_type(bytes, 0)? {
        (slots, end) if end == bytes.len() => Some(slots),
        _ => None,
    }
}

/// Parse a method descriptor such as `(IJ[Ljava/lang/String;)D`
pub fn method_shape(descriptor: &str) -> Option<MethodShape> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut cursor = 1;
    let mut parameter_slots = 0u16;
    while bytes.get(cursor) != Some(&b')') {
        let (slots, next) = field_type(bytes, cursor)?;
        parameter_slots = parameter_slots.checked_add(slots)?;
        cursor = next;
    }
    cursor += 1;
    let return_slots = if bytes.get(cursor) == Some(&b'V') && cursor + 1 == bytes.len() {
        0
    } else {
        match field_type(bytes, cursor)? {
            (slots, end) if end == bytes.len() => slots,
            _ => return None,
        }
    };
    Some(MethodShape { parameter_slots, return_slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_slots() {
        assert_eq!(field_slots("I"), Some(1));
        assert_eq!(field_slots("D"), Some(2));
        assert_eq!(field_slots("[J"), Some(1));
        assert_eq!(field_slots("Ljava/lang/Object;"), Some(1));
        assert_eq!(field_slots("Ljava/lang/Object"), None);
        assert_eq!(field_slots("II"), None);
    }

    #[test]
    fn test_method_shape() {
        assert_eq!(method_shape("()V"), Some(MethodShape { parameter_slots: 0, return_slots: 0 }));
        assert_eq!(
            method_shape("(IJ[[Ljava/lang/String;D)J"),
            Some(MethodShape { parameter_slots: 6, return_slots: 2 })
        );
        assert_eq!(method_shape("(I"), None);
        assert_eq!(method_shape("I)V"), None);
    }
}
