//! # Reconciliation
//!
//! Recomputes derived counters from their source rows and overwrites them,
//! reporting every drift found. Also sweeps read-tracking rows left behind
//! by places that no longer exist and checks structural invariants.
//!
//! | Counter                        | Source of truth                   |
//! |--------------------------------|-----------------------------------|
//! | `Counter.creators/keyholders`  | `place_members` rows per role     |
//! | `Counter.children`             | places whose parent is this place |
//! | `Counter.unlocked_children`    | `place_unlocked_children` rows    |
//! | `Counter.posts`                | `post_places` rows                |
//! | unread counter                 | `post_reads` rows                 |

use std::collections::HashMap;

use serde::Serialize;

use crate::account::AccountId;
use crate::context::Context;
use crate::error::Result;
use crate::place::{MemberRole, PlaceId};
use crate::storage::places::{self, CounterField};
use crate::storage::{accounts, posts, reads};

/// One counter that did not match its source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    /// `place:<id>` or `unread:<account>:<place>`
    pub subject: String,
    /// Counter name
    pub field: &'static str,
    /// Value found
    pub stored: i64,
    /// Value written
    pub actual: i64,
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Place counters corrected
    pub place_drift: Vec<Drift>,
    /// Unread counters corrected
    pub unread_drift: Vec<Drift>,
    /// Orphaned unread counter rows deleted
    pub orphaned_counters: usize,
    /// Orphaned unread markers deleted
    pub orphaned_markers: usize,
    /// Places with broken structural invariants (not repaired)
    pub violations: Vec<(PlaceId, Vec<String>)>,
}

impl ReconcileReport {
    /// Whether the pass found nothing to fix or report.
    pub fn is_clean(&self) -> bool {
        self.place_drift.is_empty()
            && self.unread_drift.is_empty()
            && self.orphaned_counters == 0
            && self.orphaned_markers == 0
            && self.violations.is_empty()
    }
}

/// Counter recomputation and orphan sweeping.
#[derive(Clone)]
pub struct Reconciler {
    ctx: Context,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run every pass.
    pub fn run(&self) -> Result<ReconcileReport> {
        let (orphaned_counters, orphaned_markers) = self.sweep_orphans()?;
        let report = ReconcileReport {
            place_drift: self.recount_places()?,
            unread_drift: self.recount_unread()?,
            orphaned_counters,
            orphaned_markers,
            violations: self.check_invariants()?,
        };

        if report.is_clean() {
            tracing::debug!("Reconciliation found nothing to fix");
        } else {
            tracing::warn!(
                place_drift = report.place_drift.len(),
                unread_drift = report.unread_drift.len(),
                orphaned_counters,
                orphaned_markers,
                violations = report.violations.len(),
                "Reconciliation corrected drift"
            );
        }
        Ok(report)
    }

    /// Recompute every place counter from its source rows.
    pub fn recount_places(&self) -> Result<Vec<Drift>> {
        let (drift, touched) = self.ctx.db.transaction(|tx| {
            let mut drift = Vec::new();
            let mut touched = Vec::new();

            for id in places::all_ids(tx)? {
                let Some(place) = places::get(tx, &id)? else {
                    continue;
                };
                let checks = [
                    (CounterField::Creators, "creators", place.counter.creators,
                        places::count_members(tx, &id, MemberRole::Creator)?),
                    (CounterField::Keyholders, "keyholders", place.counter.keyholders,
                        places::count_members(tx, &id, MemberRole::Keyholder)?),
                    (CounterField::Children, "children", place.counter.children,
                        places::children(tx, &id)?.len() as i64),
                    (CounterField::UnlockedChildren, "unlocked_children", place.counter.unlocked_children,
                        place.unlocked_children_ids.len() as i64),
                    (CounterField::Posts, "posts", place.counter.posts,
                        posts::count_in_place(tx, &id)?),
                ];

                let before = drift.len();
                for (field, name, stored, actual) in checks {
                    if stored != actual {
                        places::set_counter(tx, &id, field, actual)?;
                        drift.push(Drift {
                            subject: format!("place:{}", id),
                            field: name,
                            stored,
                            actual,
                        });
                    }
                }
                if drift.len() > before {
                    touched.push(id);
                }
            }
            Ok((drift, touched))
        })?;

        for id in &touched {
            self.ctx.invalidate_place(id);
        }
        Ok(drift)
    }

    /// Recompute every unread counter from the markers it summarizes.
    pub fn recount_unread(&self) -> Result<Vec<Drift>> {
        self.ctx.db.transaction(|tx| {
            let mut markers: HashMap<(AccountId, PlaceId), i64> = reads::marker_totals(tx)?
                .into_iter()
                .map(|(account, place, n)| ((account, place), n))
                .collect();

            let mut drift = Vec::new();
            for (account, place, stored) in reads::all_counters(tx)? {
                let actual = markers.remove(&(account.clone(), place.clone())).unwrap_or(0);
                if stored != actual {
                    reads::set_counter(tx, &account, &place, actual)?;
                    drift.push(unread_drift(&account, &place, stored, actual));
                }
            }
            // Markers without any counter row
            for ((account, place), actual) in markers {
                reads::set_counter(tx, &account, &place, actual)?;
                drift.push(unread_drift(&account, &place, 0, actual));
            }
            Ok(drift)
        })
    }

    /// Delete unread counters and markers whose place no longer exists.
    pub fn sweep_orphans(&self) -> Result<(usize, usize)> {
        let swept = self.ctx.db.transaction(|tx| reads::sweep_orphans(tx))?;
        if swept != (0, 0) {
            tracing::info!(counters = swept.0, markers = swept.1, "Swept orphaned read state");
        }
        Ok(swept)
    }

    /// Places whose structural invariants do not hold, including a
    /// membership index that disagrees between places and accounts.
    pub fn check_invariants(&self) -> Result<Vec<(PlaceId, Vec<String>)>> {
        self.ctx.db.read(|conn| {
            let mut out = Vec::new();
            for id in places::all_ids(conn)? {
                let Some(place) = places::get(conn, &id)? else {
                    continue;
                };
                let mut violations = place.invariant_violations();

                let indexed = accounts::accounts_with_access(conn, &id)?;
                for member in place.members() {
                    if !indexed.contains(member) {
                        violations.push(format!("{} missing from account index", member));
                    }
                }
                for account in &indexed {
                    if !place.is_member(account) {
                        violations.push(format!("{} indexed but not a member", account));
                    }
                }

                if !violations.is_empty() {
                    out.push((id, violations));
                }
            }
            Ok(out)
        })
    }
}

fn unread_drift(account: &AccountId, place: &PlaceId, stored: i64, actual: i64) -> Drift {
    Drift {
        subject: format!("unread:{}:{}", account, place),
        field: "count",
        stored,
        actual,
    }
}
