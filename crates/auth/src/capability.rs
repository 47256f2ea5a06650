//! The capability table: one declarative source of truth for every named
//! permission bit.
//!
//! Bit positions are immutable once assigned: a permission value persisted
//! in storage must decode identically across releases. Bits are grouped by
//! resource tier into reserved ranges so a combined set can be inspected per
//! tier without cross-tier leakage. New capabilities are added by extending
//! the table below; the const checks reject bit collisions and bits placed
//! outside their tier's range at compile time.

use serde::Serialize;

/// Resource tier a capability applies to.
///
/// Each tier owns a reserved 8-bit range of the 64-bit permission value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Organization,
    Venue,
    Space,
    Event,
}

impl Tier {
    /// First bit of this tier's reserved range.
    pub const fn base_bit(self) -> u8 {
        match self {
            Tier::Organization => 0,
            Tier::Venue => 8,
            Tier::Space => 16,
            Tier::Event => 24,
        }
    }

    /// Mask covering this tier's whole reserved range, including bits not
    /// yet assigned to a capability.
    pub const fn mask(self) -> u64 {
        0xFF << self.base_bit()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Organization => "organization",
            Tier::Venue => "venue",
            Tier::Space => "space",
            Tier::Event => "event",
        }
    }
}

macro_rules! capability_table {
    ($( $variant:ident = ($name:literal, $tier:ident, $bit:literal) ),+ $(,)?) => {
        /// A single named permission bit.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Capability {
            $($variant),+
        }

        impl Capability {
            /// Every assigned capability, in bit order per tier.
            pub const ALL: &'static [Capability] = &[$(Capability::$variant),+];

            /// Fixed bit position of this capability in the 64-bit value.
            pub const fn bit(self) -> u8 {
                match self {
                    $(Capability::$variant => $bit),+
                }
            }

            pub const fn tier(self) -> Tier {
                match self {
                    $(Capability::$variant => Tier::$tier),+
                }
            }

            /// Stable wire name (kebab-case), used in capability listings.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Capability::$variant => $name),+
                }
            }

            pub const fn mask(self) -> u64 {
                1u64 << self.bit()
            }
        }
    };
}

capability_table! {
    EditOrganization          = ("edit-organization", Organization, 0),
    DeleteOrganization        = ("delete-organization", Organization, 1),
    ChooseAsEventOrganization = ("choose-as-event-organization", Organization, 2),
    ChooseAsEventPartner      = ("choose-as-event-partner", Organization, 3),
    ReceiveOrganizationMsgs   = ("receive-organization-messages", Organization, 4),
    ManagePermissions         = ("manage-permissions", Organization, 5),
    ManageTeam                = ("manage-team", Organization, 6),

    AddVenue                  = ("add-venue", Venue, 8),
    EditVenue                 = ("edit-venue", Venue, 9),
    DeleteVenue               = ("delete-venue", Venue, 10),
    ChooseVenue               = ("choose-venue", Venue, 11),

    AddSpace                  = ("add-space", Space, 16),
    EditSpace                 = ("edit-space", Space, 17),
    DeleteSpace               = ("delete-space", Space, 18),

    AddEvent                  = ("add-event", Event, 24),
    EditEvent                 = ("edit-event", Event, 25),
    DeleteEvent               = ("delete-event", Event, 26),
    ReleaseEvent              = ("release-event", Event, 27),
    ViewEventInsights         = ("view-event-insights", Event, 28),
}

/// OR of every assigned capability bit.
pub(crate) const fn assigned_mask() -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < Capability::ALL.len() {
        mask |= Capability::ALL[i].mask();
        i += 1;
    }
    mask
}

// Every capability must occupy its own bit, inside its tier's range.
const _: () = {
    assert!(assigned_mask().count_ones() as usize == Capability::ALL.len());
    let mut i = 0;
    while i < Capability::ALL.len() {
        let cap = Capability::ALL[i];
        assert!(cap.mask() & cap.tier().mask() != 0);
        i += 1;
    }
};
