//! Group member indexes

use core::fmt;

use crate::Error;

/// The largest member index a group can hold.
pub const MAX_MEMBER_INDEX: u8 = u8::MAX;

/// A 1-based position of a member within the originally selected group.
///
/// Index `N` corresponds to the selected operator at position `N - 1`. MUST
/// NOT be zero.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct MemberIndex(u8);

impl MemberIndex {
    /// Create a new member index, rejecting zero.
    pub fn new(index: u8) -> Result<Self, Error> {
        if index == 0 {
            Err(Error::InvalidMemberIndex {
                index: 0,
                max: MAX_MEMBER_INDEX as usize,
            })
        } else {
            Ok(Self(index))
        }
    }

    /// Create the member index for the given 0-based position in the
    /// selected operators list.
    pub fn from_position(position: usize) -> Result<Self, Error> {
        Self::try_from(position + 1)
    }

    /// The raw index value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// The 0-based position of this member in the selected operators list.
    pub fn position(self) -> usize {
        self.0 as usize - 1
    }

    /// Check the index against the largest index allowed in some group.
    pub fn validate(self, max: usize) -> Result<Self, Error> {
        if self.0 as usize > max {
            Err(Error::InvalidMemberIndex {
                index: self.0 as usize,
                max,
            })
        } else {
            Ok(self)
        }
    }
}

impl fmt::Debug for MemberIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("MemberIndex").field(&self.0).finish()
    }
}

impl fmt::Display for MemberIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for MemberIndex {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl TryFrom<usize> for MemberIndex {
    type Error = Error;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        let index = u8::try_from(n).map_err(|_| Error::InvalidMemberIndex {
            index: n,
            max: MAX_MEMBER_INDEX as usize,
        })?;
        Self::new(index)
    }
}

impl From<MemberIndex> for u8 {
    fn from(index: MemberIndex) -> u8 {
        index.0
    }
}
