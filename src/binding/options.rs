//! Binding options: a JSON object, possibly still being computed.
//!
//! Successive `with_options` calls are merged as an object union: later keys
//! overwrite earlier ones. Pending inputs are awaited and merged in call
//! order, so the result never depends on which future finishes first.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value as JsonValue};

use crate::error::Result;
use crate::resolution::ValueOrFuture;

type SharedOptions = Shared<BoxFuture<'static, Result<JsonValue>>>;

pub(crate) enum OptionsState {
    Ready(JsonValue),
    Pending(SharedOptions),
}

impl Default for OptionsState {
    fn default() -> Self {
        Self::Ready(JsonValue::Object(Map::new()))
    }
}

impl OptionsState {
    /// Merges a ready value on top of the current options.
    pub(crate) fn merge(self, update: JsonValue) -> Self {
        match self {
            Self::Ready(current) => Self::Ready(merge_options(current, update)),
            Self::Pending(current) => Self::Pending(
                async move { Ok(merge_options(current.await?, update)) }
                    .boxed()
                    .shared(),
            ),
        }
    }

    /// Merges a pending value on top of the current options.
    pub(crate) fn merge_pending<F>(self, update: F) -> Self
    where
        F: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        let merged = match self {
            Self::Ready(current) => async move { Ok(merge_options(current, update.await?)) }.boxed(),
            Self::Pending(current) => async move {
                let (current, update) = futures::future::try_join(current, update).await?;
                Ok(merge_options(current, update))
            }
            .boxed(),
        };
        Self::Pending(merged.shared())
    }

    pub(crate) fn get(&self) -> ValueOrFuture<JsonValue> {
        match self {
            Self::Ready(value) => ValueOrFuture::ready(value.clone()),
            Self::Pending(shared) => ValueOrFuture::Pending(shared.clone().boxed()),
        }
    }
}

/// Object union of two option values; a non-object update replaces.
pub fn merge_options(current: JsonValue, update: JsonValue) -> JsonValue {
    match (current, update) {
        (JsonValue::Object(mut base), JsonValue::Object(overlay)) => {
            base.extend(overlay);
            JsonValue::Object(base)
        }
        (_, update) => update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn resolve(state: &OptionsState) -> JsonValue {
        state.get().into_future().await.unwrap()
    }

    #[test]
    fn test_merge_objects() {
        let merged = merge_options(json!({"x": 1, "y": "a"}), json!({"y": "b", "z": true}));
        assert_eq!(merged, json!({"x": 1, "y": "b", "z": true}));
    }

    #[test]
    fn test_non_object_replaces() {
        assert_eq!(merge_options(json!({"x": 1}), json!(5)), json!(5));
        assert_eq!(merge_options(json!(5), json!({"x": 1})), json!({"x": 1}));
    }

    #[test]
    fn test_ready_state_stays_sync() {
        let state = OptionsState::default().merge(json!({"x": 1})).merge(json!({"y": 2}));
        let value = state.get().into_sync("opts").unwrap();
        assert_eq!(value, json!({"x": 1, "y": 2}));
    }

    #[tokio::test]
    async fn test_pending_then_ready() {
        let state = OptionsState::default()
            .merge_pending(async { Ok(json!({"x": 1})) })
            .merge(json!({"y": "a"}));
        assert!(state.get().is_pending());
        assert_eq!(resolve(&state).await, json!({"x": 1, "y": "a"}));
    }

    #[tokio::test]
    async fn test_ready_then_pending() {
        let state = OptionsState::default()
            .merge(json!({"y": "a"}))
            .merge_pending(async { Ok(json!({"x": 1})) });
        assert_eq!(resolve(&state).await, json!({"x": 1, "y": "a"}));
    }

    #[tokio::test]
    async fn test_pending_then_pending_keeps_call_order() {
        let state = OptionsState::default()
            .merge_pending(async { Ok(json!({"y": "a", "x": 0})) })
            .merge_pending(async { Ok(json!({"x": 1})) });
        assert_eq!(resolve(&state).await, json!({"x": 1, "y": "a"}));
    }
}
