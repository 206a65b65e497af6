//! Dashboard aggregates over the record store.

use crate::classify::to_title_case;
use crate::storage::KeyValueStore;
use crate::store::{RecordStore, SessionRecord};
use crate::{Gender, NutritionStatus, SessionDetails, User};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Narrows which sessions are listed or counted
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub village: Option<String>,
    pub uc: Option<String>,
    pub created_by: Option<String>,
}

impl RecordFilter {
    /// Restrict field roles to the records they created
    pub fn scoped_to(mut self, user: &User) -> Self {
        if !user.role.can_view_all_records() {
            self.created_by = Some(user.username.clone());
        }
        self
    }

    pub fn matches(&self, details: &SessionDetails) -> bool {
        if self.from.is_some_and(|from| details.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| details.date > to) {
            return false;
        }
        if let Some(ref village) = self.village {
            if to_title_case(&details.village_name) != to_title_case(village) {
                return false;
            }
        }
        if let Some(ref uc) = self.uc {
            if !details.uc_name.eq_ignore_ascii_case(uc.trim()) {
                return false;
            }
        }
        if let Some(ref creator) = self.created_by {
            if !details.created_by.eq_ignore_ascii_case(creator) {
                return false;
            }
        }
        true
    }

    /// Sessions passing the filter, newest first
    pub fn apply<'a, T: SessionRecord>(&self, sessions: &'a [T]) -> Vec<&'a T> {
        let mut selected: Vec<&T> = sessions
            .iter()
            .filter(|s| self.matches(s.details()))
            .collect();
        selected.sort_by(|a, b| {
            b.details()
                .date
                .cmp(&a.details().date)
                .then(b.details().session_number.cmp(&a.details().session_number))
        });
        selected
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GenderBreakdown {
    pub male: usize,
    pub female: usize,
    pub other: usize,
}

impl GenderBreakdown {
    fn count(&mut self, gender: Gender) {
        match gender {
            Gender::Male => self.male += 1,
            Gender::Female => self.female += 1,
            Gender::Other => self.other += 1,
        }
    }
}

/// Aggregate figures shown on the dashboard
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub awareness_sessions: usize,
    pub screening_sessions: usize,
    pub attendees: usize,
    pub children_under_five_reached: u64,
    pub children_screened: usize,
    pub sam: usize,
    pub mam: usize,
    pub normal: usize,
    pub vaccine_due_attendees: usize,
    pub vaccine_due_children: usize,
    pub attendee_gender: GenderBreakdown,
    pub child_gender: GenderBreakdown,
    pub sessions_by_uc: BTreeMap<String, usize>,
}

impl DashboardStats {
    pub fn compute<S: KeyValueStore>(store: &RecordStore<S>, filter: &RecordFilter) -> Self {
        let mut stats = Self::default();

        for session in filter.apply(store.awareness_sessions()) {
            stats.awareness_sessions += 1;
            *stats
                .sessions_by_uc
                .entry(session.details.uc_name.clone())
                .or_default() += 1;

            for attendee in &session.attendees {
                stats.attendees += 1;
                stats.children_under_five_reached += u64::from(attendee.children_under_five);
                stats.attendee_gender.count(attendee.gender);
                if attendee.vaccine_due {
                    stats.vaccine_due_attendees += 1;
                }
            }
        }

        for screening in filter.apply(store.child_screenings()) {
            stats.screening_sessions += 1;
            *stats
                .sessions_by_uc
                .entry(screening.details.uc_name.clone())
                .or_default() += 1;

            for child in &screening.children {
                stats.children_screened += 1;
                stats.child_gender.count(child.gender);
                match child.nutrition_status {
                    NutritionStatus::Sam => stats.sam += 1,
                    NutritionStatus::Mam => stats.mam += 1,
                    NutritionStatus::Normal => stats.normal += 1,
                }
                if child.vaccine_due {
                    stats.vaccine_due_children += 1;
                }
            }
        }

        stats
    }
}
