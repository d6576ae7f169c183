//! Required-slot table per intent kind.
//!
//! Adding a kind or changing what it needs is a data change here; nothing
//! else in the turn machine hard-codes slot lists.

use crate::domain::intent::{IntentKind, SlotName};

use SlotName::{Body, Count, MessageRef, Query, Recipient, Subject};

const REQUIRED_SLOTS: &[(IntentKind, &[SlotName])] = &[
    (IntentKind::Send, &[Recipient, Subject, Body]),
    (IntentKind::Reply, &[MessageRef, Body]),
    (IntentKind::Forward, &[MessageRef, Recipient]),
    (IntentKind::Delete, &[MessageRef]),
    (IntentKind::Search, &[Query]),
    (IntentKind::Read, &[]),
    (IntentKind::Unknown, &[]),
];

const OPTIONAL_SLOTS: &[(IntentKind, &[SlotName])] = &[
    (IntentKind::Read, &[Count]),
    (IntentKind::Search, &[Count]),
    (IntentKind::Forward, &[Body]),
];

pub fn required_slots(kind: IntentKind) -> &'static [SlotName] {
    lookup(REQUIRED_SLOTS, kind)
}

pub fn optional_slots(kind: IntentKind) -> &'static [SlotName] {
    lookup(OPTIONAL_SLOTS, kind)
}

fn lookup(table: &'static [(IntentKind, &'static [SlotName])], kind: IntentKind) -> &'static [SlotName] {
    table.iter().find(|(entry, _)| *entry == kind).map(|(_, slots)| *slots).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::{optional_slots, required_slots};
    use crate::domain::intent::{IntentKind, SlotName};

    #[test]
    fn every_kind_has_a_table_entry() {
        for kind in IntentKind::ALL {
            let required = required_slots(kind);
            let optional = optional_slots(kind);
            assert!(required.iter().all(|slot| !optional.contains(slot)), "{kind} overlaps");
        }
    }

    #[test]
    fn send_requires_recipient_subject_and_body_in_order() {
        assert_eq!(
            required_slots(IntentKind::Send),
            &[SlotName::Recipient, SlotName::Subject, SlotName::Body]
        );
        assert!(required_slots(IntentKind::Read).is_empty());
        assert_eq!(optional_slots(IntentKind::Read), &[SlotName::Count]);
    }
}
