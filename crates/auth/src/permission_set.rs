//! The 64-bit permission value and its set algebra.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::{Capability, Tier, assigned_mask};

/// A bit index outside the 64-bit value.
///
/// Raw bit indices arrive over the wire (member-permission endpoints); an
/// out-of-range index is rejected here rather than silently wrapped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("permission bit {0} outside 0..=63")]
pub struct BitRangeError(pub u8);

/// An opaque 64-bit capability vector.
///
/// Stored as a signed BIGINT column in link rows; the raw bit pattern is the
/// persistence format, so decoding is stable across releases as long as the
/// capability table keeps its bit assignments.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u64);

impl PermissionSet {
    pub const EMPTY: Self = Self(0);

    /// Every bit the capability table assigns. This is the creator/owner preset.
    pub const ADMIN: Self = Self(assigned_mask());

    /// Everything but the right to hand out rights.
    pub const MANAGER: Self = Self(assigned_mask() & !Capability::ManagePermissions.mask());

    /// Event-tier writes only.
    pub const BOOKER: Self = Self(
        Capability::AddEvent.mask()
            | Capability::EditEvent.mask()
            | Capability::DeleteEvent.mask()
            | Capability::ReleaseEvent.mask(),
    );

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Decode the value as read from a signed 64-bit storage column.
    pub const fn from_stored(value: i64) -> Self {
        Self(value as u64)
    }

    /// Encode the value for a signed 64-bit storage column.
    pub const fn to_stored(self) -> i64 {
        self.0 as i64
    }

    pub const fn of(cap: Capability) -> Self {
        Self(cap.mask())
    }

    /// Const builder for composing masks out of capabilities.
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.mask())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if *any* bit of `mask` is set.
    pub const fn has_any(self, mask: Self) -> bool {
        self.0 & mask.0 != 0
    }

    /// True only if *every* bit of `mask` is set.
    pub const fn has_all(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.mask() != 0
    }

    pub fn grant(&mut self, cap: Capability) {
        self.0 |= cap.mask();
    }

    pub fn revoke(&mut self, cap: Capability) {
        self.0 &= !cap.mask();
    }

    /// Set one bit by raw index, rejecting indices outside [0, 63].
    pub fn set_bit(&mut self, bit: u8) -> Result<(), BitRangeError> {
        if bit > 63 {
            return Err(BitRangeError(bit));
        }
        self.0 |= 1u64 << bit;
        Ok(())
    }

    /// Clear one bit by raw index, rejecting indices outside [0, 63].
    pub fn clear_bit(&mut self, bit: u8) -> Result<(), BitRangeError> {
        if bit > 63 {
            return Err(BitRangeError(bit));
        }
        self.0 &= !(1u64 << bit);
        Ok(())
    }

    /// Union of two sets, used when merging multiple link rows or cascading
    /// organization permissions into venue scope.
    pub const fn combine(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// The subset of this value falling inside one tier's reserved range.
    pub const fn tier_view(self, tier: Tier) -> Self {
        Self(self.0 & tier.mask())
    }
}

impl core::fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
