//! Prefixed random hex identifiers.
//!
//! Formats are fixed by the wire/state contracts: participants are
//! `p_` + 32 hex, schedules `sched_` + 16 hex, timers `timer_` + 16 hex,
//! responses `r_` + 32 hex.

use rand::Rng;

const HEX: &[u8] = b"0123456789abcdef";

/// Generate a prefixed random lowercase-hex ID.
pub fn generate(prefix: &str, hex_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(prefix.len() + hex_len);
    out.push_str(prefix);
    for _ in 0..hex_len {
        out.push(HEX[rng.gen_range(0..16)] as char);
    }
    out
}

/// New participant ID (`p_` + 32 hex).
pub fn participant_id() -> String {
    generate("p_", 32)
}

/// New schedule ID (`sched_` + 16 hex).
pub fn schedule_id() -> String {
    generate("sched_", 16)
}

/// New timer ID (`timer_` + 16 hex).
pub fn timer_id() -> String {
    generate("timer_", 16)
}

/// New response ID (`r_` + 32 hex).
pub fn response_id() -> String {
    generate("r_", 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_format() {
        let id = participant_id();
        assert!(id.starts_with("p_"));
        assert_eq!(id.len(), 2 + 32);
        assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_schedule_id_format() {
        let id = schedule_id();
        assert!(id.starts_with("sched_"));
        assert_eq!(id.len(), 6 + 16);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = timer_id();
        let b = timer_id();
        assert_ne!(a, b);
    }
}
