//! Slot-by-slot pairing of one view against its counterpart views.
//!
//! Pure: every view has already been loaded. Fragments are grouped by
//! (slot, counterpart) so both directions of a lesson meet in one place:
//! the requested page's fragments naming `c`, and `c`'s fragments naming the
//! requested identifier.

use super::AuthorityPolicy;
use crate::error::QueryError;
use crate::model::{
    Contradiction, ContradictionKind, EntryFragment, NormalizedView, Schedule, ScheduleEntry,
    StandaloneActivity,
};
use crate::types::{ClassId, Identifier, Slot, TeacherId, ViewKind};
use log::warn;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The outcome of loading one counterpart view.
pub type CounterpartViews = HashMap<Identifier, Result<Arc<NormalizedView>, QueryError>>;

#[derive(Default)]
struct Group<'a> {
    own: Vec<&'a EntryFragment>,
    theirs: Vec<&'a EntryFragment>,
}

/// Merges `own` with its counterpart views into a [`Schedule`].
///
/// A counterpart missing from `counterparts` is treated like one that failed
/// to load.
pub fn reconcile_views(
    own: &NormalizedView,
    counterparts: &CounterpartViews,
    authority: AuthorityPolicy,
) -> Schedule {
    let mut builder = Builder::new(own, authority);

    let mut groups: BTreeMap<(Slot, Identifier), Group<'_>> = BTreeMap::new();
    for (slot, fragments) in &own.slots {
        for fragment in fragments {
            match &fragment.counterpart {
                Some(counterpart) => groups
                    .entry((*slot, counterpart.clone()))
                    .or_default()
                    .own
                    .push(fragment),
                None => builder.activities.push(StandaloneActivity {
                    slot: *slot,
                    subject: fragment.subject.clone(),
                }),
            }
        }
    }
    for view in counterparts.values().filter_map(|r| r.as_ref().ok()) {
        for (slot, fragments) in &view.slots {
            for fragment in fragments {
                if fragment.counterpart.as_ref() == Some(&own.identifier) {
                    groups
                        .entry((*slot, view.identifier.clone()))
                        .or_default()
                        .theirs
                        .push(fragment);
                }
            }
        }
    }

    for ((slot, counterpart), group) in groups {
        match counterparts.get(&counterpart) {
            Some(Ok(view)) => builder.pair(slot, view, group),
            Some(Err(err)) => builder.unavailable(slot, &counterpart, &group.own, &err.to_string()),
            None => builder.unavailable(slot, &counterpart, &group.own, "view was not loaded"),
        }
    }

    builder.finish()
}

struct Builder<'a> {
    own: &'a NormalizedView,
    authority: AuthorityPolicy,
    entries: Vec<ScheduleEntry>,
    activities: Vec<StandaloneActivity>,
    contradictions: Vec<Contradiction>,
}

impl<'a> Builder<'a> {
    fn new(own: &'a NormalizedView, authority: AuthorityPolicy) -> Self {
        Self {
            own,
            authority,
            entries: Vec::new(),
            activities: Vec::new(),
            contradictions: Vec::new(),
        }
    }

    fn pair(&mut self, slot: Slot, view: &NormalizedView, group: Group<'_>) {
        let Group { own, mut theirs } = group;
        let mut unmatched_own = Vec::new();

        // Exact subject matches first, so a mismatch never steals a partner.
        for fragment in own {
            let key = fragment.subject_key();
            match theirs.iter().position(|t| t.subject_key() == key) {
                Some(i) => {
                    let partner = theirs.remove(i);
                    self.matched(slot, &view.identifier, fragment, partner);
                }
                None => unmatched_own.push(fragment),
            }
        }

        let mut theirs = theirs.into_iter();
        for fragment in unmatched_own {
            match theirs.next() {
                Some(partner) => self.mismatched(slot, view, fragment, partner),
                None => self.missing_from_counterpart(slot, view, fragment),
            }
        }
        for partner in theirs {
            self.missing_from_own(slot, view, partner);
        }
    }

    fn matched(
        &mut self,
        slot: Slot,
        counterpart: &Identifier,
        fragment: &EntryFragment,
        partner: &EntryFragment,
    ) {
        // The class page's wording wins so both query directions agree.
        let subject = match self.own.kind {
            ViewKind::ClassView => &fragment.subject,
            ViewKind::TeacherView => &partner.subject,
        };
        self.push_entry(
            slot,
            counterpart,
            subject.clone(),
            fragment.substitute || partner.substitute,
        );
    }

    fn mismatched(
        &mut self,
        slot: Slot,
        view: &NormalizedView,
        fragment: &EntryFragment,
        partner: &EntryFragment,
    ) {
        let displayed = self.authority.displayed(self.own.kind);
        let subject = if displayed == self.own.kind {
            &fragment.subject
        } else {
            &partner.subject
        };
        self.push_entry(
            slot,
            &view.identifier,
            subject.clone(),
            fragment.substitute || partner.substitute,
        );
        self.contradictions.push(Contradiction {
            slot,
            kind: ContradictionKind::SubjectMismatch,
            counterpart: view.identifier.clone(),
            requested_reading: Some(fragment.reading()),
            counterpart_reading: Some(partner.reading()),
            displayed,
            detail: format!(
                "{} says '{}', {} says '{}'",
                self.own.identifier, fragment.subject, view.identifier, partner.subject
            ),
        });
    }

    /// The requested page lists a lesson the counterpart page does not.
    fn missing_from_counterpart(&mut self, slot: Slot, view: &NormalizedView, fragment: &EntryFragment) {
        self.push_entry(slot, &view.identifier, fragment.subject.clone(), fragment.substitute);
        let elsewhere = readings(view.fragments_at(&slot));
        let detail = match &elsewhere {
            Some(reading) => format!("{} has '{}' at this slot instead", view.identifier, reading),
            None => format!("{} is free at this slot", view.identifier),
        };
        self.contradictions.push(Contradiction {
            slot,
            kind: ContradictionKind::CounterpartMissing,
            counterpart: view.identifier.clone(),
            requested_reading: Some(fragment.reading()),
            counterpart_reading: elsewhere,
            displayed: self.own.kind,
            detail,
        });
    }

    /// The counterpart page lists a lesson with us that our page does not.
    fn missing_from_own(&mut self, slot: Slot, view: &NormalizedView, partner: &EntryFragment) {
        self.push_entry(slot, &view.identifier, partner.subject.clone(), partner.substitute);
        let own_reading = readings(self.own.fragments_at(&slot));
        self.contradictions.push(Contradiction {
            slot,
            kind: ContradictionKind::CounterpartMissing,
            counterpart: view.identifier.clone(),
            requested_reading: own_reading,
            counterpart_reading: Some(partner.reading()),
            displayed: view.kind,
            detail: format!(
                "{} lists '{}' with {} that {}'s own page does not",
                view.identifier, partner.subject, self.own.identifier, self.own.identifier
            ),
        });
    }

    fn unavailable(
        &mut self,
        slot: Slot,
        counterpart: &Identifier,
        own: &[&EntryFragment],
        reason: &str,
    ) {
        for fragment in own {
            self.push_entry(slot, counterpart, fragment.subject.clone(), fragment.substitute);
            self.contradictions.push(Contradiction {
                slot,
                kind: ContradictionKind::CounterpartUnavailable,
                counterpart: counterpart.clone(),
                requested_reading: Some(fragment.reading()),
                counterpart_reading: None,
                displayed: self.own.kind,
                detail: reason.to_string(),
            });
        }
    }

    fn push_entry(&mut self, slot: Slot, counterpart: &Identifier, subject: String, substitute: bool) {
        match entry_ids(&self.own.identifier, counterpart) {
            Some((class, teacher)) => self.entries.push(ScheduleEntry {
                slot,
                class,
                teacher,
                subject,
                substitute,
            }),
            None => warn!(
                "{} and {} are in the same namespace; dropping entry at {}",
                self.own.identifier, counterpart, slot
            ),
        }
    }

    fn finish(mut self) -> Schedule {
        self.entries.sort();
        self.entries.dedup();
        self.contradictions.sort_by_key(|c| c.slot);
        self.activities.sort_by_key(|a| a.slot);

        Schedule {
            identifier: self.own.identifier.clone(),
            entries: self.entries,
            activities: self.activities,
            contradictions: self.contradictions,
            periods: self.own.periods.clone(),
            breaks: self.own.breaks.clone(),
            break_sessions: self.own.break_sessions.clone(),
            last_update: self.own.last_update.clone(),
            warnings: self.own.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

fn entry_ids(a: &Identifier, b: &Identifier) -> Option<(ClassId, TeacherId)> {
    match (a, b) {
        (Identifier::Class(class), Identifier::Teacher(teacher))
        | (Identifier::Teacher(teacher), Identifier::Class(class)) => {
            Some((class.clone(), teacher.clone()))
        }
        _ => None,
    }
}

fn readings(fragments: &[EntryFragment]) -> Option<String> {
    if fragments.is_empty() {
        None
    } else {
        Some(
            fragments
                .iter()
                .map(EntryFragment::reading)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotBounds;
    use pretty_assertions::assert_eq;

    fn class(code: &str) -> Identifier {
        Identifier::parse(code, ViewKind::ClassView).unwrap()
    }

    fn teacher(name: &str) -> Identifier {
        Identifier::parse(name, ViewKind::TeacherView).unwrap()
    }

    fn slot(weekday: usize, period: usize) -> Slot {
        Slot::new(weekday, period, &SlotBounds::default()).unwrap()
    }

    fn view(identifier: Identifier, cells: &[((usize, usize), &str, Option<Identifier>)]) -> NormalizedView {
        let mut slots: BTreeMap<Slot, Vec<EntryFragment>> = BTreeMap::new();
        for ((weekday, period), subject, counterpart) in cells {
            slots.entry(slot(*weekday, *period)).or_default().push(EntryFragment {
                subject: subject.to_string(),
                counterpart: counterpart.clone(),
                substitute: false,
            });
        }
        NormalizedView {
            kind: identifier.kind(),
            identifier,
            slots,
            periods: Vec::new(),
            breaks: Vec::new(),
            break_sessions: Vec::new(),
            last_update: None,
            warnings: Vec::new(),
        }
    }

    fn loaded(views: Vec<NormalizedView>) -> CounterpartViews {
        views
            .into_iter()
            .map(|v| (v.identifier.clone(), Ok(Arc::new(v))))
            .collect()
    }

    #[test]
    fn agreeing_views_produce_clean_entry() {
        let own = view(class("101"), &[((1, 3), "Math", Some(teacher("王大明")))]);
        let theirs = view(teacher("王大明"), &[((1, 3), "math ", Some(class("101")))]);

        let schedule = reconcile_views(&own, &loaded(vec![theirs]), AuthorityPolicy::default());

        assert!(schedule.is_clean());
        assert_eq!(
            schedule.entries,
            vec![ScheduleEntry {
                slot: slot(1, 3),
                class: class("101").as_class().unwrap().clone(),
                teacher: teacher("王大明").as_teacher().unwrap().clone(),
                subject: "Math".to_string(),
                substitute: false,
            }]
        );
    }

    #[test]
    fn subject_mismatch_keeps_both_readings() {
        let own = view(class("101"), &[((1, 3), "Math", Some(teacher("王大明")))]);
        let theirs = view(teacher("王大明"), &[((1, 3), "Physics", Some(class("101")))]);

        let schedule = reconcile_views(&own, &loaded(vec![theirs]), AuthorityPolicy::RequestedView);

        assert_eq!(schedule.entries[0].subject, "Math");
        let contradiction = &schedule.contradictions[0];
        assert_eq!(contradiction.kind, ContradictionKind::SubjectMismatch);
        assert_eq!(contradiction.requested_reading.as_deref(), Some("Math @ 王大明"));
        assert_eq!(contradiction.counterpart_reading.as_deref(), Some("Physics @ 101"));
        assert_eq!(contradiction.displayed, ViewKind::ClassView);
    }

    #[test]
    fn teacher_authority_displays_teacher_subject() {
        let own = view(class("101"), &[((1, 3), "Math", Some(teacher("王大明")))]);
        let theirs = view(teacher("王大明"), &[((1, 3), "Physics", Some(class("101")))]);

        let schedule = reconcile_views(&own, &loaded(vec![theirs]), AuthorityPolicy::TeacherView);

        assert_eq!(schedule.entries[0].subject, "Physics");
        assert_eq!(schedule.contradictions[0].displayed, ViewKind::TeacherView);
    }

    #[test]
    fn counterpart_teaching_elsewhere_is_missing() {
        let own = view(class("101"), &[((1, 3), "Math", Some(teacher("王大明")))]);
        let theirs = view(teacher("王大明"), &[((1, 3), "Physics", Some(class("102")))]);

        let schedule = reconcile_views(&own, &loaded(vec![theirs]), AuthorityPolicy::default());

        assert_eq!(schedule.entries.len(), 1);
        assert_eq!(schedule.entries[0].subject, "Math");
        let contradiction = &schedule.contradictions[0];
        assert_eq!(contradiction.kind, ContradictionKind::CounterpartMissing);
        assert_eq!(contradiction.counterpart_reading.as_deref(), Some("Physics @ 102"));
    }

    #[test]
    fn lesson_only_on_counterpart_page_is_surfaced() {
        let own = view(
            class("101"),
            &[((1, 1), "國文", Some(teacher("林小華")))],
        );
        let theirs = view(
            teacher("林小華"),
            &[
                ((1, 1), "國文", Some(class("101"))),
                ((2, 2), "國文", Some(class("101"))),
            ],
        );

        let schedule = reconcile_views(&own, &loaded(vec![theirs]), AuthorityPolicy::default());

        assert_eq!(schedule.entries.len(), 2);
        assert_eq!(schedule.contradictions.len(), 1);
        assert_eq!(schedule.contradictions[0].slot, slot(2, 2));
        assert_eq!(schedule.contradictions[0].requested_reading, None);
        assert_eq!(schedule.contradictions[0].displayed, ViewKind::TeacherView);
    }

    #[test]
    fn failed_counterpart_degrades_to_contradiction() {
        let own = view(class("101"), &[((4, 5), "化學", Some(teacher("李四")))]);
        let mut counterparts = CounterpartViews::new();
        counterparts.insert(
            teacher("李四"),
            Err(QueryError::Unavailable {
                reason: "503".to_string(),
            }),
        );

        let schedule = reconcile_views(&own, &counterparts, AuthorityPolicy::default());

        assert_eq!(schedule.entries.len(), 1);
        assert_eq!(
            schedule.contradictions[0].kind,
            ContradictionKind::CounterpartUnavailable
        );
    }

    #[test]
    fn substitution_pairs_by_counterpart() {
        let own = view(
            class("101"),
            &[
                ((3, 2), "英文", Some(teacher("陳一"))),
                ((3, 2), "英文", Some(teacher("陳二"))),
            ],
        );
        let first = view(teacher("陳一"), &[((3, 2), "英文", Some(class("101")))]);
        let second = view(teacher("陳二"), &[((3, 2), "英文", Some(class("101")))]);

        let schedule = reconcile_views(&own, &loaded(vec![first, second]), AuthorityPolicy::default());

        assert!(schedule.is_clean());
        assert_eq!(schedule.entries.len(), 2);
    }

    #[test]
    fn cells_without_counterpart_become_activities() {
        let own = view(class("101"), &[((5, 7), "班會", None)]);
        let schedule = reconcile_views(&own, &CounterpartViews::new(), AuthorityPolicy::default());

        assert!(schedule.entries.is_empty());
        assert_eq!(
            schedule.activities,
            vec![StandaloneActivity {
                slot: slot(5, 7),
                subject: "班會".to_string(),
            }]
        );
    }
}
