//! Change Ledger (spec.md §4.4): validates pending mutations on a
//! `ComposeStack` and applies them atomically at deploy time. Grounded on
//! `original_source/backend/compose/models.py`'s
//! `ComposeStack.apply_pending_changes` / `ComposeStackChange` — the
//! persistence (transaction, row creation) stays with the caller (`lib/
//! database`); this crate only owns the validation and apply *logic*.

use std::collections::HashSet;

use thiserror::Error;
use zane_client::entities::change::{
  ChangeField, ChangeType, ComposeContentChangePayload, ComposeStackChange,
  EnvOverrideChangePayload,
};
use zane_client::entities::env_override::ComposeStackEnvOverride;
use zane_client::entities::stack::ComposeStack;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
  #[error("env override key '{0}' already present on this stack")]
  DuplicateEnvKey(String),
  #[error("env override '{0}' not found")]
  OverrideNotFound(String),
  #[error("a pending change already exists for item '{0}'")]
  DuplicatePendingItem(String),
}

/// Caller-supplied intent for `addChange`, mirroring the two `new_value`
/// payload shapes spec.md §4.4 allows.
pub enum NewChange {
  ComposeContentUpdate(ComposeContentChangePayload),
  EnvOverrideAdd(EnvOverrideChangePayload),
  EnvOverrideUpdate {
    item_id: String,
    payload: EnvOverrideChangePayload,
  },
  EnvOverrideDelete {
    item_id: String,
  },
}

/// What the caller should do in its own transaction to record the change.
pub enum ChangePlan {
  Insert(ComposeStackChange),
  /// `compose_content` already has a pending change: overwrite its
  /// `new_value` in place rather than inserting a second row (spec.md §4.4,
  /// §8 invariant 1: at most one pending `compose_content` change per
  /// stack).
  ReplaceInPlace {
    change_id: String,
    new_value: serde_json::Value,
  },
}

/// The set of `(service, key)` pairs an env-override ADD would collide with,
/// after folding in not-yet-applied pending changes (spec.md §4.4: "counting
/// pending ADDs and net of pending DELETEs").
fn effective_override_keys(
  existing: &[ComposeStackEnvOverride],
  pending: &[ComposeStackChange],
) -> HashSet<(Option<String>, String)> {
  let mut keys: HashSet<(Option<String>, String)> = existing
    .iter()
    .map(|o| (o.service.clone(), o.key.clone()))
    .collect();

  for change in pending {
    if change.applied || change.field != ChangeField::EnvOverrides {
      continue;
    }
    match change.change_type {
      ChangeType::Add => {
        if let Some(payload) = change
          .new_value
          .as_ref()
          .and_then(|v| serde_json::from_value::<EnvOverrideChangePayload>(v.clone()).ok())
        {
          keys.insert((payload.service, payload.key));
        }
      }
      ChangeType::Delete => {
        if let Some(item_id) = &change.item_id {
          if let Some(existing_override) = existing.iter().find(|o| &o.id == item_id) {
            keys.remove(&(existing_override.service.clone(), existing_override.key.clone()));
          }
        }
      }
      ChangeType::Update => {}
    }
  }

  keys
}

fn pending_item_id(change: &ComposeStackChange) -> Option<&str> {
  if change.applied {
    return None;
  }
  change.item_id.as_deref()
}

/// Validates `new_change` against the stack's currently pending changes and
/// its persisted env overrides, returning what the caller should persist.
/// Does not mutate anything; the caller commits `ChangePlan` inside its own
/// transaction (spec.md §4.4 `addChange`).
pub fn plan_add_change(
  stack_id: &str,
  pending: &[ComposeStackChange],
  existing_overrides: &[ComposeStackEnvOverride],
  new_change: NewChange,
  new_change_id: impl FnOnce() -> String,
  now_ms: i64,
) -> Result<ChangePlan, LedgerError> {
  match new_change {
    NewChange::ComposeContentUpdate(payload) => {
      let new_value = serde_json::to_value(&payload).expect("payload serializes");
      let existing = pending.iter().find(|c| {
        !c.applied && c.field == ChangeField::ComposeContent
      });
      if let Some(existing) = existing {
        Ok(ChangePlan::ReplaceInPlace {
          change_id: existing.id.clone(),
          new_value,
        })
      } else {
        Ok(ChangePlan::Insert(ComposeStackChange {
          id: new_change_id(),
          stack_id: stack_id.to_string(),
          field: ChangeField::ComposeContent,
          change_type: ChangeType::Update,
          item_id: None,
          old_value: None,
          new_value: Some(new_value),
          applied: false,
          deployment_hash: None,
          created_at_ms: now_ms,
        }))
      }
    }
    NewChange::EnvOverrideAdd(payload) => {
      let keys = effective_override_keys(existing_overrides, pending);
      if keys.contains(&(payload.service.clone(), payload.key.clone())) {
        return Err(LedgerError::DuplicateEnvKey(payload.key));
      }
      let new_value = serde_json::to_value(&payload).expect("payload serializes");
      Ok(ChangePlan::Insert(ComposeStackChange {
        id: new_change_id(),
        stack_id: stack_id.to_string(),
        field: ChangeField::EnvOverrides,
        change_type: ChangeType::Add,
        item_id: None,
        old_value: None,
        new_value: Some(new_value),
        applied: false,
        deployment_hash: None,
        created_at_ms: now_ms,
      }))
    }
    NewChange::EnvOverrideUpdate { item_id, payload } => {
      require_existing_override(existing_overrides, &item_id)?;
      require_no_pending_item(pending, &item_id)?;
      let new_value = serde_json::to_value(&payload).expect("payload serializes");
      Ok(ChangePlan::Insert(ComposeStackChange {
        id: new_change_id(),
        stack_id: stack_id.to_string(),
        field: ChangeField::EnvOverrides,
        change_type: ChangeType::Update,
        item_id: Some(item_id),
        old_value: None,
        new_value: Some(new_value),
        applied: false,
        deployment_hash: None,
        created_at_ms: now_ms,
      }))
    }
    NewChange::EnvOverrideDelete { item_id } => {
      require_existing_override(existing_overrides, &item_id)?;
      require_no_pending_item(pending, &item_id)?;
      Ok(ChangePlan::Insert(ComposeStackChange {
        id: new_change_id(),
        stack_id: stack_id.to_string(),
        field: ChangeField::EnvOverrides,
        change_type: ChangeType::Delete,
        item_id: Some(item_id),
        old_value: None,
        new_value: None,
        applied: false,
        deployment_hash: None,
        created_at_ms: now_ms,
      }))
    }
  }
}

fn require_existing_override(
  existing: &[ComposeStackEnvOverride],
  item_id: &str,
) -> Result<(), LedgerError> {
  if existing.iter().any(|o| o.id == item_id) {
    Ok(())
  } else {
    Err(LedgerError::OverrideNotFound(item_id.to_string()))
  }
}

fn require_no_pending_item(
  pending: &[ComposeStackChange],
  item_id: &str,
) -> Result<(), LedgerError> {
  if pending.iter().any(|c| pending_item_id(c) == Some(item_id)) {
    Err(LedgerError::DuplicatePendingItem(item_id.to_string()))
  } else {
    Ok(())
  }
}

/// Outcome of applying one pending change, telling the caller what row-level
/// mutation to perform against its env-override collection.
pub enum OverrideMutation {
  Upsert(ComposeStackEnvOverride),
  Remove { id: String },
}

/// Applies every not-yet-applied change in `pending` (creation order) onto
/// `stack`'s in-memory fields, returning the env-override mutations the
/// caller must also persist, plus the ids of changes to mark
/// `applied=true`/`deployment_hash=<hash>` (spec.md §4.4 `applyPending`).
///
/// Pure in-memory transform: the caller wraps this in its own DB
/// transaction (spec.md §9 "ambient stack" — persistence stays in `lib/
/// database`).
pub fn apply_pending(
  stack: &mut ComposeStack,
  pending: &[ComposeStackChange],
  new_override_id: impl Fn() -> String,
) -> (Vec<OverrideMutation>, Vec<String>) {
  let mut mutations = Vec::new();
  let mut applied_ids = Vec::new();

  for change in pending {
    if change.applied {
      continue;
    }
    match change.field {
      ChangeField::ComposeContent => {
        if let Some(new_value) = &change.new_value {
          if let Ok(payload) =
            serde_json::from_value::<ComposeContentChangePayload>(new_value.clone())
          {
            stack.user_content = Some(payload.user_content);
            stack.computed_content = Some(payload.computed_content);
            stack.urls = serde_json::from_value(payload.urls).ok();
            stack.configs = serde_json::from_value(payload.configs).ok();
          }
        }
      }
      ChangeField::EnvOverrides => match change.change_type {
        ChangeType::Add => {
          if let Some(payload) = change
            .new_value
            .as_ref()
            .and_then(|v| serde_json::from_value::<EnvOverrideChangePayload>(v.clone()).ok())
          {
            mutations.push(OverrideMutation::Upsert(ComposeStackEnvOverride {
              id: new_override_id(),
              stack_id: stack.id.clone(),
              service: payload.service,
              key: payload.key,
              value: payload.value,
            }));
          }
        }
        ChangeType::Update => {
          if let (Some(item_id), Some(payload)) = (
            &change.item_id,
            change
              .new_value
              .as_ref()
              .and_then(|v| serde_json::from_value::<EnvOverrideChangePayload>(v.clone()).ok()),
          ) {
            mutations.push(OverrideMutation::Upsert(ComposeStackEnvOverride {
              id: item_id.clone(),
              stack_id: stack.id.clone(),
              service: payload.service,
              key: payload.key,
              value: payload.value,
            }));
          }
        }
        ChangeType::Delete => {
          if let Some(item_id) = &change.item_id {
            mutations.push(OverrideMutation::Remove {
              id: item_id.clone(),
            });
          }
        }
      },
    }
    applied_ids.push(change.id.clone());
  }

  (mutations, applied_ids)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stack() -> ComposeStack {
    ComposeStack {
      id: "compose_stk_abc".to_string(),
      slug: "demo".to_string(),
      project_id: "proj_1".to_string(),
      environment_id: "env_1".to_string(),
      network_alias_prefix: "demo".to_string(),
      deploy_token: "tok".to_string(),
      user_content: None,
      computed_content: None,
      urls: None,
      configs: None,
      service_statuses: Default::default(),
      remembered_ports: Default::default(),
      created_at_ms: 0,
      updated_at_ms: 0,
    }
  }

  #[test]
  fn second_content_change_replaces_in_place() {
    let first = ComposeStackChange {
      id: "stk_chg_1".to_string(),
      stack_id: "compose_stk_abc".to_string(),
      field: ChangeField::ComposeContent,
      change_type: ChangeType::Update,
      item_id: None,
      old_value: None,
      new_value: None,
      applied: false,
      deployment_hash: None,
      created_at_ms: 0,
    };
    let payload = ComposeContentChangePayload {
      user_content: "services: {}".to_string(),
      computed_content: "services: {}".to_string(),
      urls: serde_json::json!({}),
      configs: serde_json::json!({}),
    };
    let plan = plan_add_change(
      "compose_stk_abc",
      &[first],
      &[],
      NewChange::ComposeContentUpdate(payload),
      || "stk_chg_2".to_string(),
      1,
    )
    .unwrap();
    match plan {
      ChangePlan::ReplaceInPlace { change_id, .. } => {
        assert_eq!(change_id, "stk_chg_1")
      }
      ChangePlan::Insert(_) => panic!("expected replace-in-place"),
    }
  }

  #[test]
  fn add_rejects_duplicate_key() {
    let existing = ComposeStackEnvOverride {
      id: "stk_env_1".to_string(),
      stack_id: "compose_stk_abc".to_string(),
      service: None,
      key: "DB_URL".to_string(),
      value: "postgres://x".to_string(),
    };
    let result = plan_add_change(
      "compose_stk_abc",
      &[],
      &[existing],
      NewChange::EnvOverrideAdd(EnvOverrideChangePayload {
        key: "DB_URL".to_string(),
        value: "postgres://y".to_string(),
        service: None,
      }),
      || "stk_chg_1".to_string(),
      1,
    );
    assert_eq!(
      result.unwrap_err(),
      LedgerError::DuplicateEnvKey("DB_URL".to_string())
    );
  }

  #[test]
  fn update_rejects_second_pending_change_on_same_item() {
    let existing = ComposeStackEnvOverride {
      id: "stk_env_1".to_string(),
      stack_id: "compose_stk_abc".to_string(),
      service: None,
      key: "DB_URL".to_string(),
      value: "postgres://x".to_string(),
    };
    let pending = ComposeStackChange {
      id: "stk_chg_1".to_string(),
      stack_id: "compose_stk_abc".to_string(),
      field: ChangeField::EnvOverrides,
      change_type: ChangeType::Update,
      item_id: Some("stk_env_1".to_string()),
      old_value: None,
      new_value: None,
      applied: false,
      deployment_hash: None,
      created_at_ms: 0,
    };
    let result = plan_add_change(
      "compose_stk_abc",
      &[pending],
      &[existing],
      NewChange::EnvOverrideDelete {
        item_id: "stk_env_1".to_string(),
      },
      || "stk_chg_2".to_string(),
      1,
    );
    assert_eq!(
      result.unwrap_err(),
      LedgerError::DuplicatePendingItem("stk_env_1".to_string())
    );
  }

  #[test]
  fn apply_pending_mutates_stack_and_emits_override_ops() {
    let mut s = stack();
    let content_change = ComposeStackChange {
      id: "stk_chg_1".to_string(),
      stack_id: s.id.clone(),
      field: ChangeField::ComposeContent,
      change_type: ChangeType::Update,
      item_id: None,
      old_value: None,
      new_value: Some(
        serde_json::to_value(ComposeContentChangePayload {
          user_content: "services:\n  web:\n    image: nginx".to_string(),
          computed_content: "services:\n  web:\n    image: nginx".to_string(),
          urls: serde_json::json!({}),
          configs: serde_json::json!({}),
        })
        .unwrap(),
      ),
      applied: false,
      deployment_hash: None,
      created_at_ms: 0,
    };
    let env_add = ComposeStackChange {
      id: "stk_chg_2".to_string(),
      stack_id: s.id.clone(),
      field: ChangeField::EnvOverrides,
      change_type: ChangeType::Add,
      item_id: None,
      old_value: None,
      new_value: Some(
        serde_json::to_value(EnvOverrideChangePayload {
          key: "DB_URL".to_string(),
          value: "postgres://x".to_string(),
          service: None,
        })
        .unwrap(),
      ),
      applied: false,
      deployment_hash: None,
      created_at_ms: 0,
    };
    let (mutations, applied) =
      apply_pending(&mut s, &[content_change, env_add], || "stk_env_1".to_string());
    assert_eq!(s.user_content.as_deref(), Some("services:\n  web:\n    image: nginx"));
    assert_eq!(mutations.len(), 1);
    assert_eq!(applied, vec!["stk_chg_1", "stk_chg_2"]);
  }
}
