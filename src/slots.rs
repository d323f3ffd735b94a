use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::database::models::{EventRecord, StaffRole};
use crate::discord::ChatPlatform;
use crate::error::EventError;
use crate::sheet::SheetLog;
use crate::store::EventStore;

/// Resolves racing claims for the Judge and Recorder slots.
///
/// Preconditions are checked in order: the event exists, the claimant is
/// authorized, the match has not started, the slot is free. The capability
/// check goes out to the chat platform and can be slow, so it runs before
/// the record lock is taken; the time and slot checks are then re-validated
/// inside the critical section. However many claimants race on the same
/// slot, exactly one sees success and the rest see `AlreadyClaimed`.
pub struct SlotAssignmentCoordinator<C, S> {
    store: Arc<EventStore>,
    chat: Arc<C>,
    sheet: Arc<S>,
}

impl<C, S> SlotAssignmentCoordinator<C, S>
where
    C: ChatPlatform + 'static,
    S: SheetLog + 'static,
{
    pub fn new(store: Arc<EventStore>, chat: Arc<C>, sheet: Arc<S>) -> Self {
        Self { store, chat, sheet }
    }

    pub async fn claim(
        &self,
        event_id: &str,
        role: StaffRole,
        claimant: &str,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, EventError> {
        self.store.get(event_id).await?;

        let authorized = match self.chat.can_staff(claimant, role).await {
            Ok(authorized) => authorized,
            Err(e) => {
                warn!("Capability check failed for {}: {}", claimant, e);
                false
            }
        };
        if !authorized {
            return Err(EventError::Unauthorized(role));
        }

        let updated = self
            .store
            .mutate(event_id, |record| {
                if record.has_started(now) {
                    return Err(EventError::MatchAlreadyStarted(record.id.clone()));
                }
                if let Some(holder) = record.slot(role) {
                    return Err(EventError::AlreadyClaimed {
                        role,
                        holder: holder.clone(),
                    });
                }
                record.set_slot(role, claimant);
                Ok(record.clone())
            })
            .await?;

        // The claim is committed; everything below is best-effort.
        if let Err(e) = self
            .chat
            .grant_channel_access(&updated.channel_id, claimant)
            .await
        {
            warn!("Error adding {} to channel {}: {}", claimant, updated.channel_id, e);
        }

        let announcement = format!(
            "🔔 {} has been assigned as the **{}** for this match!",
            self.chat.mention(claimant),
            role
        );
        if let Err(e) = self.chat.send_message(&updated.channel_id, &announcement).await {
            warn!("Error announcing {} assignment on {}: {}", role, event_id, e);
        }

        self.push_staff_to_sheet(event_id, role, claimant).await;

        Ok(updated)
    }

    /// Privileged reassignment: overwrites the slot regardless of holder.
    ///
    /// This is not a claim — organizer-level authorization is enforced by
    /// the command layer before it reaches here.
    pub async fn exchange(
        &self,
        event_id: &str,
        role: StaffRole,
        new_user: &str,
    ) -> Result<EventRecord, EventError> {
        let updated = self
            .store
            .mutate(event_id, |record| {
                record.set_slot(role, new_user);
                Ok(record.clone())
            })
            .await?;

        let notice = format!(
            "🔄 {} is now the **{}** for this event.",
            self.chat.mention(new_user),
            role
        );
        if let Err(e) = self.chat.send_message(&updated.channel_id, &notice).await {
            warn!("Error announcing {} exchange on {}: {}", role, event_id, e);
        }

        self.push_staff_to_sheet(event_id, role, new_user).await;

        Ok(updated)
    }

    /// Fire-and-forget spreadsheet update; a sheet failure never undoes the
    /// assignment.
    async fn push_staff_to_sheet(&self, event_id: &str, role: StaffRole, user_ref: &str) {
        let name = match self.chat.display_name(user_ref).await {
            Ok(name) => name,
            Err(_) => user_ref.to_string(),
        };
        let sheet = self.sheet.clone();
        let id = event_id.to_string();
        tokio::spawn(async move {
            let (judge, recorder) = match role {
                StaffRole::Judge => (Some(name.as_str()), None),
                StaffRole::Recorder => (None, Some(name.as_str())),
            };
            if let Err(e) = sheet.update_staff(&id, judge, recorder).await {
                warn!("Error updating staff in sheet for {}: {}", id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DurableStore;
    use crate::test_utils::{record_starting_in, FakeChat, FakeSheet};
    use chrono::Duration;
    use futures::future::join_all;

    type Coordinator = SlotAssignmentCoordinator<FakeChat, FakeSheet>;

    fn fixture(chat: FakeChat) -> (Arc<EventStore>, Arc<FakeChat>, Coordinator) {
        let store = Arc::new(EventStore::new(Arc::new(DurableStore::Memory)));
        let chat = Arc::new(chat);
        let slots =
            SlotAssignmentCoordinator::new(store.clone(), chat.clone(), Arc::new(FakeSheet::new()));
        (store, chat, slots)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_produce_exactly_one_winner() {
        let (store, _, slots) = fixture(FakeChat::allowing_all());
        let slots = Arc::new(slots);
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        store.create(record).await.unwrap();

        let claims = (0..8).map(|i| {
            let slots = slots.clone();
            let id = id.clone();
            tokio::spawn(async move {
                slots
                    .claim(&id, StaffRole::Judge, &format!("claimant-{}", i), now)
                    .await
            })
        });
        let outcomes: Vec<_> = join_all(claims)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(winners, 1);
        for outcome in &outcomes {
            if let Err(e) = outcome {
                assert!(matches!(e, EventError::AlreadyClaimed { role: StaffRole::Judge, .. }));
            }
        }

        // The stored judge is the single winner's reference.
        let judge = store.get(&id).await.unwrap().judge.unwrap();
        assert!(judge.starts_with("claimant-"));
    }

    #[tokio::test]
    async fn claim_checks_preconditions_in_order() {
        let (store, _, slots) = fixture(FakeChat::allowing(&["judge-1"]));
        let now = Utc::now();

        // Unknown event comes first, even for an unauthorized caller.
        assert_eq!(
            slots.claim("EVT-missing", StaffRole::Judge, "rando", now).await.unwrap_err(),
            EventError::EventNotFound("EVT-missing".to_string())
        );

        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        store.create(record).await.unwrap();

        assert_eq!(
            slots.claim(&id, StaffRole::Judge, "rando", now).await.unwrap_err(),
            EventError::Unauthorized(StaffRole::Judge)
        );

        // Authorized, but the match already kicked off.
        let late = now + Duration::hours(2);
        assert_eq!(
            slots.claim(&id, StaffRole::Judge, "judge-1", late).await.unwrap_err(),
            EventError::MatchAlreadyStarted(id.clone())
        );

        let updated = slots.claim(&id, StaffRole::Judge, "judge-1", now).await.unwrap();
        assert_eq!(updated.judge.as_deref(), Some("judge-1"));
    }

    #[tokio::test]
    async fn failed_claims_leave_the_record_unchanged() {
        let (store, chat, slots) = fixture(FakeChat::allowing_all());
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        store.create(record).await.unwrap();

        slots.claim(&id, StaffRole::Judge, "first", now).await.unwrap();
        let before = store.get(&id).await.unwrap();
        let sent_before = chat.sent_messages().len();

        let err = slots.claim(&id, StaffRole::Judge, "second", now).await.unwrap_err();
        assert_eq!(
            err,
            EventError::AlreadyClaimed {
                role: StaffRole::Judge,
                holder: "first".to_string()
            }
        );
        assert_eq!(store.get(&id).await.unwrap(), before);
        // No notification goes out for a lost claim.
        assert_eq!(chat.sent_messages().len(), sent_before);
    }

    #[tokio::test]
    async fn winning_claim_grants_access_and_announces() {
        let (store, chat, slots) = fixture(FakeChat::allowing_all());
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        let channel = record.channel_id.clone();
        store.create(record).await.unwrap();

        slots.claim(&id, StaffRole::Recorder, "rec-9", now).await.unwrap();

        assert_eq!(chat.grants(), vec![(channel.clone(), "rec-9".to_string())]);
        let sent = chat.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Recorder"));
        assert!(sent[0].1.contains("<@rec-9>"));
    }

    #[tokio::test]
    async fn roles_are_claimed_independently() {
        let (store, _, slots) = fixture(FakeChat::allowing_all());
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        store.create(record).await.unwrap();

        slots.claim(&id, StaffRole::Judge, "j-1", now).await.unwrap();
        let updated = slots.claim(&id, StaffRole::Recorder, "r-1", now).await.unwrap();

        assert_eq!(updated.judge.as_deref(), Some("j-1"));
        assert_eq!(updated.recorder.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn exchange_overwrites_an_occupied_slot() {
        let (store, _, slots) = fixture(FakeChat::allowing_all());
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        store.create(record).await.unwrap();

        slots.claim(&id, StaffRole::Judge, "original", now).await.unwrap();
        let updated = slots.exchange(&id, StaffRole::Judge, "replacement").await.unwrap();

        assert_eq!(updated.judge.as_deref(), Some("replacement"));
    }
}
