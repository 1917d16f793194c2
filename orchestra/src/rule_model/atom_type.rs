//! This module defines [AtomType].

use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Role tag of an [Atom][super::atom::Atom]
///
/// The tag selects which physical version of a relation the atom reads or
/// writes during incremental evaluation. For a relation `R` the version is
/// stored in the table `R_<TAG>`, except for [AtomType::None] which denotes `R` itself.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum AtomType {
    /// Current state of the relation
    #[default]
    #[strum(serialize = "NONE")]
    None,
    /// State after applying the delta
    #[strum(serialize = "NEW")]
    New,
    /// Insertion delta
    #[strum(serialize = "INS")]
    Ins,
    /// Deletion delta
    #[strum(serialize = "DEL")]
    Del,
    /// Tuples that are still reachable, used for IDBs only
    #[strum(serialize = "RCH")]
    Rch,
    /// Inverse; holds side effects of bidirectional deletions
    #[strum(serialize = "INV")]
    Inv,
    /// All deletions; not used in stratified deletion
    #[strum(serialize = "ALLDEL")]
    AllDel,
    /// Result of the update policy
    #[strum(serialize = "D")]
    D,
}

impl AtomType {
    /// Return the suffix this tag appends to a relation name, if any.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            AtomType::None => None,
            AtomType::New => Some("NEW"),
            AtomType::Ins => Some("INS"),
            AtomType::Del => Some("DEL"),
            AtomType::Rch => Some("RCH"),
            AtomType::Inv => Some("INV"),
            AtomType::AllDel => Some("ALLDEL"),
            AtomType::D => Some("D"),
        }
    }

    /// Return the name of the physical table holding this version of `relation`.
    pub fn staging_name(self, relation: &str) -> String {
        match self.suffix() {
            Some(suffix) => format!("{relation}_{suffix}"),
            None => relation.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::AtomType;

    #[test]
    fn staging_names() {
        assert_eq!(AtomType::None.staging_name("Emp"), "Emp");
        assert_eq!(AtomType::Ins.staging_name("Emp"), "Emp_INS");
        assert_eq!(AtomType::Del.staging_name("Emp_L"), "Emp_L_DEL");
        assert_eq!(AtomType::D.staging_name("Emp"), "Emp_D");
    }

    #[test]
    fn names_round_trip() {
        for atom_type in AtomType::iter() {
            assert_eq!(AtomType::from_str(atom_type.as_ref()).unwrap(), atom_type);
        }
        assert_eq!(AtomType::Ins.to_string(), "INS");
        assert_eq!(AtomType::None.to_string(), "NONE");
    }
}
