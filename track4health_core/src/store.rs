//! Record store for awareness sessions, child screenings and GPS photos.
//!
//! The store owns the in-memory collections and writes the full collection
//! back to its storage key after every change. Mutations are applied to a
//! copy which only replaces the live collection once it has been persisted,
//! so a failed write leaves memory and disk in agreement.

use crate::storage::{keys, load_json, save_json, KeyValueStore};
use crate::{
    Attendee, AwarenessSession, ChildScreening, Entry, GpsPhoto, Result, ScreenedChild,
    SessionDetails, SessionKind,
};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Common view over both session kinds
pub trait SessionRecord: Clone + Serialize {
    const KIND: SessionKind;

    fn new_empty(id: Uuid, details: SessionDetails) -> Self;
    fn id(&self) -> Uuid;
    fn details(&self) -> &SessionDetails;
    fn details_mut(&mut self) -> &mut SessionDetails;
    fn entry_count(&self) -> usize;
    /// Id, name and father/guardian name of every entry
    fn identities(&self) -> Vec<(Uuid, &str, &str)>;
}

impl SessionRecord for AwarenessSession {
    const KIND: SessionKind = SessionKind::Awareness;

    fn new_empty(id: Uuid, details: SessionDetails) -> Self {
        Self {
            id,
            details,
            attendees: Vec::new(),
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut SessionDetails {
        &mut self.details
    }

    fn entry_count(&self) -> usize {
        self.attendees.len()
    }

    fn identities(&self) -> Vec<(Uuid, &str, &str)> {
        self.attendees
            .iter()
            .map(|a| (a.id, a.name.as_str(), a.father_husband_name.as_str()))
            .collect()
    }
}

impl SessionRecord for ChildScreening {
    const KIND: SessionKind = SessionKind::Screening;

    fn new_empty(id: Uuid, details: SessionDetails) -> Self {
        Self {
            id,
            details,
            children: Vec::new(),
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut SessionDetails {
        &mut self.details
    }

    fn entry_count(&self) -> usize {
        self.children.len()
    }

    fn identities(&self) -> Vec<(Uuid, &str, &str)> {
        self.children
            .iter()
            .map(|c| (c.id, c.name.as_str(), c.father_name.as_str()))
            .collect()
    }
}

/// Persistent collections of field records
pub struct RecordStore<S: KeyValueStore> {
    storage: S,
    awareness: Vec<AwarenessSession>,
    screenings: Vec<ChildScreening>,
    photos: Vec<GpsPhoto>,
}

/// Apply `change` to a copy of `current`; persist and swap it in if it reports a change
fn commit<S, T, F>(storage: &mut S, key: &str, current: &mut Vec<T>, change: F) -> Result<bool>
where
    S: KeyValueStore,
    T: Clone + Serialize,
    F: FnOnce(&mut Vec<T>) -> bool,
{
    let mut next = current.clone();
    if !change(&mut next) {
        return Ok(false);
    }
    save_json(storage, key, &next)?;
    *current = next;
    Ok(true)
}

fn insert_session<T: SessionRecord>(sessions: &mut Vec<T>, id: Uuid, details: SessionDetails) -> bool {
    sessions.push(T::new_empty(id, details));
    true
}

fn update_session_details<T: SessionRecord>(
    sessions: &mut [T],
    id: Uuid,
    details: SessionDetails,
) -> bool {
    match sessions.iter_mut().find(|s| s.id() == id) {
        Some(session) => {
            *session.details_mut() = details;
            true
        }
        None => false,
    }
}

fn remove_by<T, F>(items: &mut Vec<T>, matches: F) -> bool
where
    F: Fn(&T) -> bool,
{
    let before = items.len();
    items.retain(|item| !matches(item));
    items.len() != before
}

/// Overlay `remote` on `local`: matching ids are replaced, new ids appended
fn merge_by_id<T: SessionRecord>(local: &mut Vec<T>, remote: Vec<T>) -> bool {
    for session in remote {
        match local.iter_mut().find(|s| s.id() == session.id()) {
            Some(slot) => *slot = session,
            None => local.push(session),
        }
    }
    true
}

fn same_place(details: &SessionDetails, village: &str, date: NaiveDate) -> bool {
    details.date == date
        && crate::classify::to_title_case(&details.village_name)
            == crate::classify::to_title_case(village)
}

impl<S: KeyValueStore> RecordStore<S> {
    /// Load every collection from storage
    ///
    /// Missing or corrupt snapshots start out as empty collections.
    pub fn open(storage: S) -> Self {
        let awareness: Vec<AwarenessSession> =
            load_json(&storage, keys::AWARENESS_SESSIONS).unwrap_or_default();
        let screenings: Vec<ChildScreening> =
            load_json(&storage, keys::CHILD_SCREENINGS).unwrap_or_default();
        let photos: Vec<GpsPhoto> = load_json(&storage, keys::GPS_PHOTOS).unwrap_or_default();

        tracing::debug!(
            "Opened record store: {} awareness sessions, {} screenings, {} photos",
            awareness.len(),
            screenings.len(),
            photos.len()
        );

        Self {
            storage,
            awareness,
            screenings,
            photos,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn awareness_sessions(&self) -> &[AwarenessSession] {
        &self.awareness
    }

    pub fn child_screenings(&self) -> &[ChildScreening] {
        &self.screenings
    }

    pub fn photos(&self) -> &[GpsPhoto] {
        &self.photos
    }

    pub fn awareness(&self, id: Uuid) -> Option<&AwarenessSession> {
        self.awareness.iter().find(|s| s.id == id)
    }

    pub fn screening(&self, id: Uuid) -> Option<&ChildScreening> {
        self.screenings.iter().find(|s| s.id == id)
    }

    /// Shared details of a session of either kind
    pub fn session_details(&self, kind: SessionKind, id: Uuid) -> Option<&SessionDetails> {
        match kind {
            SessionKind::Awareness => self.awareness(id).map(|s| &s.details),
            SessionKind::Screening => self.screening(id).map(|s| &s.details),
        }
    }

    /// Create a session with a fresh id and no entries
    pub fn add_session(&mut self, kind: SessionKind, details: SessionDetails) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let key = kind.storage_key();
        match kind {
            SessionKind::Awareness => commit(&mut self.storage, key, &mut self.awareness, |s| {
                insert_session(s, id, details)
            })?,
            SessionKind::Screening => commit(&mut self.storage, key, &mut self.screenings, |s| {
                insert_session(s, id, details)
            })?,
        };
        tracing::info!("Added {} {}", kind, id);
        Ok(id)
    }

    /// Create an awareness session together with its attendance list in one write
    pub fn add_awareness_with_attendees(
        &mut self,
        details: SessionDetails,
        attendees: Vec<Attendee>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        commit(
            &mut self.storage,
            keys::AWARENESS_SESSIONS,
            &mut self.awareness,
            |sessions| {
                sessions.push(AwarenessSession {
                    id,
                    details,
                    attendees,
                });
                true
            },
        )?;
        tracing::info!("Added awareness session {}", id);
        Ok(id)
    }

    /// Create a child screening together with its children in one write
    pub fn add_screening_with_children(
        &mut self,
        details: SessionDetails,
        children: Vec<ScreenedChild>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        commit(
            &mut self.storage,
            keys::CHILD_SCREENINGS,
            &mut self.screenings,
            |sessions| {
                sessions.push(ChildScreening {
                    id,
                    details,
                    children,
                });
                true
            },
        )?;
        tracing::info!("Added child screening {}", id);
        Ok(id)
    }

    /// Replace every field of a session except its id and entries
    ///
    /// Returns false (and writes nothing) when no session has `id`.
    pub fn update_session(
        &mut self,
        kind: SessionKind,
        id: Uuid,
        details: SessionDetails,
    ) -> Result<bool> {
        let key = kind.storage_key();
        let updated = match kind {
            SessionKind::Awareness => commit(&mut self.storage, key, &mut self.awareness, |s| {
                update_session_details(s, id, details)
            })?,
            SessionKind::Screening => commit(&mut self.storage, key, &mut self.screenings, |s| {
                update_session_details(s, id, details)
            })?,
        };
        if updated {
            tracing::info!("Updated {} {}", kind, id);
        }
        Ok(updated)
    }

    /// Remove a session; deleting an absent id is a no-op
    pub fn delete_session(&mut self, kind: SessionKind, id: Uuid) -> Result<bool> {
        let key = kind.storage_key();
        let deleted = match kind {
            SessionKind::Awareness => commit(&mut self.storage, key, &mut self.awareness, |s| {
                remove_by(s, |session| session.id == id)
            })?,
            SessionKind::Screening => commit(&mut self.storage, key, &mut self.screenings, |s| {
                remove_by(s, |session| session.id == id)
            })?,
        };
        if deleted {
            tracing::info!("Deleted {} {}", kind, id);
        }
        Ok(deleted)
    }

    /// Append an entry to the session of the matching kind
    ///
    /// Returns false when the owning session does not exist.
    pub fn add_entry(&mut self, session_id: Uuid, entry: impl Into<Entry>) -> Result<bool> {
        let entry = entry.into();
        let key = entry.kind().storage_key();
        match entry {
            Entry::Attendee(attendee) => {
                commit(&mut self.storage, key, &mut self.awareness, |sessions| {
                    match sessions.iter_mut().find(|s| s.id == session_id) {
                        Some(session) => {
                            session.attendees.push(attendee);
                            true
                        }
                        None => false,
                    }
                })
            }
            Entry::Child(child) => {
                commit(&mut self.storage, key, &mut self.screenings, |sessions| {
                    match sessions.iter_mut().find(|s| s.id == session_id) {
                        Some(session) => {
                            session.children.push(child);
                            true
                        }
                        None => false,
                    }
                })
            }
        }
    }

    /// Replace the entry with the same id inside the owning session
    pub fn update_entry(&mut self, session_id: Uuid, entry: impl Into<Entry>) -> Result<bool> {
        let entry = entry.into();
        let key = entry.kind().storage_key();
        match entry {
            Entry::Attendee(attendee) => {
                let target = attendee.id;
                commit(&mut self.storage, key, &mut self.awareness, |sessions| {
                    sessions
                        .iter_mut()
                        .find(|s| s.id == session_id)
                        .and_then(|s| s.attendees.iter_mut().find(|a| a.id == target))
                        .map(|slot| *slot = attendee)
                        .is_some()
                })
            }
            Entry::Child(child) => {
                let target = child.id;
                commit(&mut self.storage, key, &mut self.screenings, |sessions| {
                    sessions
                        .iter_mut()
                        .find(|s| s.id == session_id)
                        .and_then(|s| s.children.iter_mut().find(|c| c.id == target))
                        .map(|slot| *slot = child)
                        .is_some()
                })
            }
        }
    }

    /// Remove an entry from its session; absent ids are a no-op
    pub fn delete_entry(
        &mut self,
        kind: SessionKind,
        session_id: Uuid,
        entry_id: Uuid,
    ) -> Result<bool> {
        let key = kind.storage_key();
        match kind {
            SessionKind::Awareness => {
                commit(&mut self.storage, key, &mut self.awareness, |sessions| {
                    sessions
                        .iter_mut()
                        .find(|s| s.id == session_id)
                        .map(|s| remove_by(&mut s.attendees, |a| a.id == entry_id))
                        .unwrap_or(false)
                })
            }
            SessionKind::Screening => {
                commit(&mut self.storage, key, &mut self.screenings, |sessions| {
                    sessions
                        .iter_mut()
                        .find(|s| s.id == session_id)
                        .map(|s| remove_by(&mut s.children, |c| c.id == entry_id))
                        .unwrap_or(false)
                })
            }
        }
    }

    /// Identities already recorded for a village on a date, across all sessions of `kind`
    pub fn identities_on(
        &self,
        kind: SessionKind,
        village: &str,
        date: NaiveDate,
    ) -> Vec<(&str, &str)> {
        self.identities_on_except(kind, village, date, None)
    }

    /// Like [`identities_on`](Self::identities_on), leaving out the entry `skip`
    pub fn identities_on_except(
        &self,
        kind: SessionKind,
        village: &str,
        date: NaiveDate,
        skip: Option<Uuid>,
    ) -> Vec<(&str, &str)> {
        match kind {
            SessionKind::Awareness => identities_matching(&self.awareness, village, date, skip),
            SessionKind::Screening => identities_matching(&self.screenings, village, date, skip),
        }
    }

    /// Merge server copies of awareness sessions into the local collection
    pub fn merge_awareness_sessions(&mut self, sessions: Vec<AwarenessSession>) -> Result<()> {
        commit(
            &mut self.storage,
            keys::AWARENESS_SESSIONS,
            &mut self.awareness,
            |local| merge_by_id(local, sessions),
        )?;
        Ok(())
    }

    /// Merge server copies of child screenings into the local collection
    pub fn merge_child_screenings(&mut self, screenings: Vec<ChildScreening>) -> Result<()> {
        commit(
            &mut self.storage,
            keys::CHILD_SCREENINGS,
            &mut self.screenings,
            |local| merge_by_id(local, screenings),
        )?;
        Ok(())
    }

    pub fn add_photo(&mut self, photo: GpsPhoto) -> Result<()> {
        let id = photo.id;
        commit(&mut self.storage, keys::GPS_PHOTOS, &mut self.photos, |photos| {
            photos.push(photo);
            true
        })?;
        tracing::info!("Saved GPS photo {}", id);
        Ok(())
    }

    pub fn delete_photo(&mut self, id: Uuid) -> Result<bool> {
        commit(&mut self.storage, keys::GPS_PHOTOS, &mut self.photos, |photos| {
            remove_by(photos, |p| p.id == id)
        })
    }
}

fn identities_matching<'a, T: SessionRecord>(
    sessions: &'a [T],
    village: &str,
    date: NaiveDate,
    skip: Option<Uuid>,
) -> Vec<(&'a str, &'a str)> {
    sessions
        .iter()
        .filter(|s| same_place(s.details(), village, date))
        .flat_map(|s| s.identities())
        .filter(|(id, _, _)| Some(*id) != skip)
        .map(|(_, name, father)| (name, father))
        .collect()
}
