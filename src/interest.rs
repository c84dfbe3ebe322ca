use std::{fmt, ops};

/// Readiness interest a socket requests from the poll backend.
///
/// Only readable and writable interest exist; everything else the backends
/// report (hang-up, error) is folded into readable so the state machine sees
/// it on its read path.
#[derive(Copy, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub(crate) struct Interest(u8);

const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

impl Interest {
    pub(crate) const READABLE: Interest = Interest(READABLE);
    pub(crate) const WRITABLE: Interest = Interest(WRITABLE);

    /// Add together two `Interest`s; usable in const context unlike `BitOr`.
    pub(crate) const fn add(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    pub(crate) const fn is_readable(self) -> bool {
        (self.0 & READABLE) != 0
    }

    pub(crate) const fn is_writable(self) -> bool {
        (self.0 & WRITABLE) != 0
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;

    #[inline]
    fn bitor(self, other: Interest) -> Interest {
        self.add(other)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one = false;
        if self.is_readable() {
            write!(fmt, "READABLE")?;
            one = true;
        }
        if self.is_writable() {
            if one {
                write!(fmt, " | ")?;
            }
            write!(fmt, "WRITABLE")?;
            one = true;
        }
        if !one {
            write!(fmt, "NONE")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Interest;

    #[test]
    fn combine() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable());
        assert!(both.is_writable());
        assert!(!Interest::READABLE.is_writable());
        assert!(!Interest::WRITABLE.is_readable());
        assert_eq!(format!("{:?}", both), "READABLE | WRITABLE");
    }
}
