//! Configurable limits for bounded decoding.

/// Wire-level limits for packet decoding.
///
/// Enforced before any section body is touched. Limits on ghost counts and
/// slice sizes belong to the codec layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum packet size in bytes.
    pub max_packet_bytes: usize,

    /// Maximum number of sections in a packet.
    pub max_sections: usize,

    /// Maximum length of a single section body in bytes.
    pub max_section_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Snapshots are budgeted well below this; acks are tiny.
            max_packet_bytes: 64 * 1024,
            // A snapshot carries at most a despawn and a ghost section.
            max_sections: 4,
            max_section_len: 60 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bytes: 4096,
            max_sections: 4,
            max_section_len: 1024,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bytes: usize::MAX,
            max_sections: usize::MAX,
            max_section_len: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_fit_a_snapshot() {
        let limits = Limits::default();
        assert!(limits.max_sections >= 2);
        assert!(limits.max_section_len < limits.max_packet_bytes);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = Limits::for_testing();
        let default_limits = Limits::default();

        assert!(test_limits.max_packet_bytes < default_limits.max_packet_bytes);
        assert!(test_limits.max_section_len < default_limits.max_section_len);
    }

    #[test]
    fn unlimited_limits() {
        let limits = Limits::unlimited();
        assert_eq!(limits.max_packet_bytes, usize::MAX);
        assert_eq!(limits.max_sections, usize::MAX);
        assert_eq!(limits.max_section_len, usize::MAX);
    }

    #[test]
    fn limits_const_constructible() {
        const LIMITS: Limits = Limits::for_testing();
        assert_eq!(LIMITS.max_packet_bytes, 4096);
    }
}
