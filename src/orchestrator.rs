// Copyright 2025 Cowboy AI, LLC.

//! Weaving pass orchestration
//!
//! [`Weaver::weave`] runs every phase over a scratch copy of the module and
//! commits the copy only when no error was reported. A failed pass leaves
//! the caller's module exactly as it was.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{classify, contributions};
use crate::composer;
use crate::config::WeaveConfig;
use crate::errors::WeaveResult;
use crate::messages::{MessageCode, OperationResult};
use crate::model::{Module, MutationStamp};
use crate::registry::{RoleRegistry, TypeEntry};
use crate::resolver::views::process_views;
use crate::resolver::{resolve, CompositionContext};
use crate::self_type;
use crate::splitter::{self, RewriteRules, RoleCatalog};
use crate::verify::{run_verifier, StructuralVerifier, Verifier};

/// Runs weaving passes with one configuration
#[derive(Clone)]
pub struct Weaver {
    config: WeaveConfig,
    verifier: Option<Arc<dyn Verifier>>,
}

impl std::fmt::Debug for Weaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weaver")
            .field("config", &self.config)
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new(WeaveConfig::default())
    }
}

impl Weaver {
    /// Create a weaver
    pub fn new(config: WeaveConfig) -> Self {
        Self {
            config,
            verifier: None,
        }
    }

    /// Use `verifier` instead of the built-in structural checks when
    /// verification is enabled
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Weave every role composition in `module`
    pub fn weave(&self, module: &mut Module) -> OperationResult {
        let mut result = OperationResult::new();
        if module.is_mutated() {
            result.report(
                MessageCode::AlreadyMutated,
                format!("module {} has already been woven, nothing to do", module.name),
            );
            info!(module = %module.name, "module already woven");
            return result;
        }

        info!(module = %module.name, types = module.len(), "weaving started");
        let source: &Module = module;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(source, &mut result)));
        let scratch = match outcome {
            Ok(Ok(scratch)) => scratch,
            Ok(Err(error)) => {
                result.report(MessageCode::InternalError, error.to_string());
                None
            }
            Err(payload) => {
                result.report(
                    MessageCode::InternalError,
                    format!("weaving panicked: {}", panic_message(payload.as_ref())),
                );
                None
            }
        };

        if self.config.treat_warnings_as_errors {
            let escalated = result.escalate_warnings();
            if escalated > 0 {
                warn!(module = %module.name, escalated, "warnings escalated to errors");
            }
        }

        let Some(mut scratch) = scratch.filter(|_| result.success()) else {
            info!(module = %module.name, errors = result.errors().count(), "weaving failed, module left untouched");
            return result;
        };

        scratch.mutation_stamp = Some(MutationStamp::now());
        if self.config.run_verification {
            let verifier = self
                .verifier
                .clone()
                .unwrap_or_else(|| Arc::new(StructuralVerifier));
            run_verifier(verifier, &scratch, self.config.verification_timeout, &mut result);
            if !result.success() {
                info!(module = %module.name, "verification rejected the woven module");
                return result;
            }
        }

        *module = scratch;
        info!(module = %module.name, messages = result.len(), "weaving committed");
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// All phases over a scratch copy. Returns the copy when every phase
/// succeeded.
fn run(module: &Module, result: &mut OperationResult) -> WeaveResult<Option<Module>> {
    let registry = RoleRegistry::build(module, result);
    if !result.success() {
        return Ok(None);
    }

    splitter::check_roles(module, &registry, result);
    self_type::check(module, &registry, result);
    if !result.success() {
        return Ok(None);
    }

    let mut scratch = module.clone();
    let mut catalog = RoleCatalog::new();
    let mut rules = RewriteRules::new();

    for name in registry.order() {
        let Some(entry) = registry.entry(name) else {
            continue;
        };
        if entry.is_composition() {
            compose(&mut scratch, &registry, &catalog, entry, result)?;
        }
        if entry.is_role {
            let (split, rule) = splitter::split_role(&mut scratch, name, result)?;
            catalog.insert(split);
            rules.add(rule);
        }
    }
    if !result.success() {
        return Ok(None);
    }

    let rewritten = rules.apply(&mut scratch);
    debug!(roles = catalog.len(), rewritten, "role references rewritten");
    Ok(Some(scratch))
}

/// Compose one type. Planning is skipped once the type's groups produced
/// an error, so nothing half-resolved is applied.
fn compose(
    module: &mut Module,
    registry: &RoleRegistry,
    catalog: &RoleCatalog,
    entry: &TypeEntry,
    result: &mut OperationResult,
) -> WeaveResult<()> {
    let errors_before = result.errors().count();
    let decisions = process_views(
        module,
        registry,
        catalog,
        &entry.name,
        &entry.composed,
        &entry.views,
        result,
    );
    let composition = module.require_type(&entry.name)?;
    let contributed = contributions(module, catalog, composition, &entry.composed, &decisions)?;
    let groups = classify(&entry.name, &contributed, result);
    let context = CompositionContext {
        name: &entry.name,
        is_role: entry.is_role,
    };
    let resolutions = resolve(&groups, context, result);
    if result.errors().count() > errors_before {
        debug!(composition = %entry.name, "composition skipped after errors");
        return Ok(());
    }

    let plan = composer::plan(module, catalog, entry, &groups, &resolutions, result)?;
    if result.errors().count() > errors_before {
        return Ok(());
    }
    composer::apply(module, plan)?;
    debug!(composition = %entry.name, roles = entry.composed.len(), "composition woven");
    Ok(())
}
