//! Shared fixtures for unit tests.

use tokio::sync::mpsc;

use crate::access::AccessControlEngine;
use crate::account::{AccountId, AccountService};
use crate::config::CoreConfig;
use crate::context::Context;
use crate::events::{ChannelSink, Event};
use crate::lifecycle::PlaceLifecycle;
use crate::membership::MembershipEngine;
use crate::place::{Place, PlaceId};
use crate::posts::PostIndex;
use crate::read_tracking::ReadTrackingEngine;
use crate::reconcile::Reconciler;

pub(crate) struct TestEnv {
    pub ctx: Context,
    events: mpsc::UnboundedReceiver<Event>,
}

pub(crate) async fn env() -> TestEnv {
    env_with(CoreConfig::default()).await
}

pub(crate) async fn env_with(config: CoreConfig) -> TestEnv {
    let (sink, events) = ChannelSink::new();
    let ctx = Context::in_memory(config)
        .await
        .unwrap()
        .with_events(std::sync::Arc::new(sink));
    TestEnv { ctx, events }
}

impl TestEnv {
    pub fn access(&self) -> AccessControlEngine {
        AccessControlEngine::new(self.ctx.clone())
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.ctx.clone())
    }

    pub fn membership(&self) -> MembershipEngine {
        MembershipEngine::new(self.ctx.clone())
    }

    pub fn reads(&self) -> ReadTrackingEngine {
        ReadTrackingEngine::new(self.ctx.clone())
    }

    pub fn posts(&self) -> PostIndex {
        PostIndex::new(self.ctx.clone())
    }

    pub fn lifecycle(&self) -> PlaceLifecycle {
        PlaceLifecycle::new(self.ctx.clone())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.ctx.clone())
    }

    /// Register an account named after its ID.
    pub fn account(&self, id: &str) -> AccountId {
        let id = AccountId::parse(id).unwrap();
        self.accounts().register(&id, id.as_str()).unwrap();
        id
    }

    /// Register an account and add it as keyholder of `place`.
    pub fn keyholder(&self, place: &Place, id: &str) -> AccountId {
        let account = self.account(id);
        assert!(self.membership().add_keyholder(&place.id, &account).unwrap());
        account
    }

    pub fn grand_place(&self, id: &str, creator: &AccountId) -> Place {
        let id = PlaceId::parse(id).unwrap();
        self.lifecycle().create_grand_place(&id, id.as_str(), creator).unwrap()
    }

    pub fn personal_place(&self, id: &str, creator: &AccountId) -> Place {
        let id = PlaceId::parse(id).unwrap();
        self.lifecycle().create_personal_place(&id, id.as_str(), creator).unwrap()
    }

    pub fn personal_child(&self, parent: &Place, segment: &str, creator: &AccountId) -> Place {
        let id = parent.id.child(segment).unwrap();
        self.lifecycle().create_personal_place(&id, segment, creator).unwrap()
    }

    pub fn locked_child(&self, parent: &Place, segment: &str, creator: &AccountId) -> Place {
        let id = parent.id.child(segment).unwrap();
        self.lifecycle().create_locked_place(&id, segment, creator).unwrap()
    }

    pub fn unlocked_child(&self, parent: &Place, segment: &str, creator: &AccountId) -> Place {
        let id = parent.id.child(segment).unwrap();
        self.lifecycle().create_unlocked_place(&id, segment, creator).unwrap()
    }

    /// Fresh copy of a place straight from the store.
    pub fn reload(&self, id: &PlaceId) -> Place {
        self.ctx.invalidate_place(id);
        self.ctx.load_place(id).unwrap().unwrap()
    }

    /// Every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
