//! Reconciliation: one identifier's view plus its direct counterparts'
//! views become a single [`Schedule`].
//!
//! Only one hop is followed. Counterpart views load concurrently, and all of
//! them settle before the schedule is built. A counterpart that fails to
//! load becomes a contradiction; only the requested view's own failure fails
//! the request.

mod pairing;

pub use pairing::{reconcile_views, CounterpartViews};

use crate::cache::CachePolicy;
use crate::error::QueryError;
use crate::model::Schedule;
use crate::pipeline::ViewSource;
use crate::types::{Identifier, ValidationError, ViewKind};
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Whose subject text is displayed when the two pages disagree.
///
/// The contradiction record keeps both readings whatever the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityPolicy {
    /// The page of the identifier that was asked for.
    #[default]
    RequestedView,
    ClassView,
    TeacherView,
}

impl AuthorityPolicy {
    /// The view kind whose reading is displayed for a request from `requested`.
    pub fn displayed(self, requested: ViewKind) -> ViewKind {
        match self {
            AuthorityPolicy::RequestedView => requested,
            AuthorityPolicy::ClassView => ViewKind::ClassView,
            AuthorityPolicy::TeacherView => ViewKind::TeacherView,
        }
    }
}

impl fmt::Display for AuthorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorityPolicy::RequestedView => "requested",
            AuthorityPolicy::ClassView => "class",
            AuthorityPolicy::TeacherView => "teacher",
        };
        f.write_str(name)
    }
}

impl FromStr for AuthorityPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requested" | "requested_view" => Ok(AuthorityPolicy::RequestedView),
            "class" | "class_view" => Ok(AuthorityPolicy::ClassView),
            "teacher" | "teacher_view" => Ok(AuthorityPolicy::TeacherView),
            other => Err(ValidationError::InvalidConfig(format!(
                "unknown authority '{}', expected requested, class or teacher",
                other
            ))),
        }
    }
}

/// Builds schedules from views supplied by a [`ViewSource`].
pub struct Reconciler {
    views: Arc<dyn ViewSource>,
    authority: AuthorityPolicy,
}

impl Reconciler {
    pub fn new(views: Arc<dyn ViewSource>, authority: AuthorityPolicy) -> Self {
        Self { views, authority }
    }

    /// Reconciles `identifier` against every counterpart its page names.
    ///
    /// `own_policy` governs how the requested view is read from the view
    /// cache; `counterpart_policy` governs the counterpart views.
    pub async fn reconcile(
        &self,
        identifier: &Identifier,
        own_policy: CachePolicy,
        counterpart_policy: CachePolicy,
    ) -> Result<Schedule, QueryError> {
        let own = self.views.view(identifier, own_policy).await?;
        let counterparts = own.counterparts();
        info!(
            "Reconciling {} against {} counterpart pages",
            identifier,
            counterparts.len()
        );

        let loads = counterparts.into_iter().map(|counterpart| async move {
            let view = self.views.view(&counterpart, counterpart_policy).await;
            (counterpart, view)
        });
        let loaded: CounterpartViews = join_all(loads).await.into_iter().collect();

        for (counterpart, result) in &loaded {
            if let Err(e) = result {
                warn!("Counterpart {} unavailable for {}: {}", counterpart, identifier, e);
            }
        }

        let schedule = reconcile_views(&own, &loaded, self.authority);
        if schedule.is_clean() {
            info!("{}: {} entries, no contradictions", identifier, schedule.entries.len());
        } else {
            for contradiction in &schedule.contradictions {
                info!("{}: {}", identifier, contradiction);
            }
        }
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryFragment, NormalizedView};
    use crate::types::{Slot, SlotBounds};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves prebuilt views and counts lookups per identifier.
    struct FixedViews {
        views: HashMap<Identifier, Arc<NormalizedView>>,
        lookups: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ViewSource for FixedViews {
        async fn view(
            &self,
            identifier: &Identifier,
            _policy: CachePolicy,
        ) -> Result<Arc<NormalizedView>, QueryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.views
                .get(identifier)
                .cloned()
                .ok_or_else(|| QueryError::not_found(identifier, "no fixture"))
        }
    }

    fn single(identifier: &Identifier, subject: &str, counterpart: &Identifier) -> NormalizedView {
        let slot = Slot::new(1, 1, &SlotBounds::default()).unwrap();
        let mut slots = BTreeMap::new();
        slots.insert(
            slot,
            vec![EntryFragment {
                subject: subject.to_string(),
                counterpart: Some(counterpart.clone()),
                substitute: false,
            }],
        );
        NormalizedView {
            identifier: identifier.clone(),
            kind: identifier.kind(),
            slots,
            periods: Vec::new(),
            breaks: Vec::new(),
            break_sessions: Vec::new(),
            last_update: None,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn own_view_failure_fails_the_request() {
        let views = FixedViews {
            views: HashMap::new(),
            lookups: AtomicUsize::new(0),
        };
        let reconciler = Reconciler::new(Arc::new(views), AuthorityPolicy::default());
        let class = Identifier::parse("101", ViewKind::ClassView).unwrap();

        let err = reconciler
            .reconcile(&class, CachePolicy::AllowStale, CachePolicy::AllowStale)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_counterpart_page_still_yields_schedule() {
        let class = Identifier::parse("101", ViewKind::ClassView).unwrap();
        let teacher = Identifier::parse("王大明", ViewKind::TeacherView).unwrap();
        let mut views = HashMap::new();
        views.insert(class.clone(), Arc::new(single(&class, "數學", &teacher)));
        let source = Arc::new(FixedViews {
            views,
            lookups: AtomicUsize::new(0),
        });
        let reconciler = Reconciler::new(source.clone(), AuthorityPolicy::default());

        let schedule = reconciler
            .reconcile(&class, CachePolicy::AllowStale, CachePolicy::AllowStale)
            .await
            .unwrap();

        assert_eq!(schedule.entries.len(), 1);
        assert_eq!(
            schedule.contradictions[0].kind,
            crate::model::ContradictionKind::CounterpartUnavailable
        );
        // One hop: the requested view and its single counterpart.
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn authority_parses_from_cli_names() {
        assert_eq!("class".parse::<AuthorityPolicy>().unwrap(), AuthorityPolicy::ClassView);
        assert_eq!(
            AuthorityPolicy::RequestedView.displayed(ViewKind::TeacherView),
            ViewKind::TeacherView
        );
        assert!("both".parse::<AuthorityPolicy>().is_err());
    }
}
