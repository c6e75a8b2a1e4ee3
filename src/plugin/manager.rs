// src/plugin/manager.rs

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::{HotswapError, Result};
use crate::listener::{ListenerId, NotifierHub, ReloadListener};
use crate::plugin::hook::{HookDecl, HookEvent, HookPoint, HookTarget, Hookable};
use crate::transform::{
    DeferredHook, Phases, RegistrationId, TransformError, TransformSite, Transformed, Transformer,
    TransformerRegistry,
};
use crate::types::LoaderScope;
use crate::watch::ChangeKind;

/// Where a binding is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookBackend {
    Transformer(RegistrationId),
    Listener(ListenerId),
}

/// A live hook: one plugin member bound in one loader scope.
#[derive(Clone)]
pub struct HookBinding {
    plugin: Arc<dyn Hookable>,
    member: String,
    scope: Option<LoaderScope>,
    point: HookPoint,
    backend: HookBackend,
}

impl fmt::Debug for HookBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBinding")
            .field("plugin", &self.plugin.name())
            .field("member", &self.member)
            .field("scope", &self.scope)
            .field("point", &self.point)
            .field("backend", &self.backend)
            .finish()
    }
}

impl HookBinding {
    pub fn plugin(&self) -> &Arc<dyn Hookable> {
        &self.plugin
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn scope(&self) -> Option<&LoaderScope> {
        self.scope.as_ref()
    }

    pub fn point(&self) -> &HookPoint {
        &self.point
    }

    pub fn backend(&self) -> HookBackend {
        self.backend
    }

    fn is_instance(&self, key: usize) -> bool {
        instance_key(&self.plugin) == key
    }

    fn same_identity(&self, key: usize, member: &str, scope: Option<&LoaderScope>) -> bool {
        self.is_instance(key) && self.member == member && self.scope.as_ref() == scope
    }
}

// Identity of a plugin instance, independent of the vtable half of the
// trait-object pointer.
fn instance_key(plugin: &Arc<dyn Hookable>) -> usize {
    Arc::as_ptr(plugin) as *const () as usize
}

/// Synthetic transformer behind a class-load hook. It never touches the
/// bytes; it only defers the hook call until the unit is committed.
struct HookTransformer {
    plugin: Arc<dyn Hookable>,
    member: String,
    label: String,
    phases: Phases,
}

impl Transformer for HookTransformer {
    fn name(&self) -> &str {
        &self.label
    }

    fn phases(&self) -> Phases {
        self.phases
    }

    fn transform(
        &self,
        site: &mut TransformSite<'_>,
        _bytes: &[u8],
    ) -> std::result::Result<Transformed, TransformError> {
        let plugin = Arc::clone(&self.plugin);
        let member = self.member.clone();
        let event = HookEvent::UnitDefined {
            unit: site.owner().clone(),
            phase: site.phase(),
        };
        site.defer(DeferredHook::new(self.label.clone(), move || {
            plugin.on_hook(&member, &event)
        }));
        Ok(Transformed::Unchanged)
    }
}

/// Listener behind a resource-change hook.
struct HookListener {
    plugin: Arc<dyn Hookable>,
    member: String,
    label: String,
    scope: Option<LoaderScope>,
    pattern: Regex,
}

impl ReloadListener for HookListener {
    fn name(&self) -> &str {
        &self.label
    }

    fn on_reload_success(&self, _unit: &crate::types::UnitId) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_resource_changed(
        &self,
        path: &Path,
        kind: ChangeKind,
        scope: Option<&LoaderScope>,
    ) -> anyhow::Result<()> {
        if let Some(own) = &self.scope {
            if scope != Some(own) {
                return Ok(());
            }
        }
        if !self.pattern.is_match(&path.to_string_lossy()) {
            return Ok(());
        }
        self.plugin.on_hook(
            &self.member,
            &HookEvent::ResourceChanged {
                path: path.to_path_buf(),
                kind,
            },
        )
    }
}

/// Binds plugin hooks to the transformer registry and the notifier hub.
///
/// Without a hub, resource-change hooks have no backend and are rejected at
/// bind time.
pub struct PluginManager {
    registry: Arc<TransformerRegistry>,
    notifiers: Option<Arc<NotifierHub>>,
    bindings: Mutex<Vec<HookBinding>>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("bindings", &self.len())
            .field("has_notifiers", &self.notifiers.is_some())
            .finish()
    }
}

impl PluginManager {
    pub fn new(registry: Arc<TransformerRegistry>, notifiers: Option<Arc<NotifierHub>>) -> Self {
        Self {
            registry,
            notifiers,
            bindings: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HookBinding>> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind every hook `plugin` declares and return all of its bindings.
    ///
    /// All declarations are validated before anything is installed, so an
    /// invalid one leaves no partial registration behind. Binding the same
    /// instance again is a no-op for members already bound in its scope.
    pub fn bind_hooks(&self, plugin: Arc<dyn Hookable>) -> Result<Vec<HookBinding>> {
        let scope = plugin.owner_scope();
        let key = instance_key(&plugin);

        let mut validated: Vec<HookDecl> = Vec::new();
        for decl in plugin.hooks() {
            self.validate(plugin.name(), &decl)?;
            if validated.iter().any(|d| d.member == decl.member) {
                debug!(plugin = %plugin.name(), member = %decl.member, "duplicate hook declaration ignored");
                continue;
            }
            validated.push(decl);
        }

        let mut bindings = self.lock();
        let mut added: Vec<HookBinding> = Vec::new();

        for decl in validated {
            if bindings
                .iter()
                .any(|b| b.same_identity(key, &decl.member, scope.as_ref()))
            {
                debug!(plugin = %plugin.name(), member = %decl.member, "hook already bound");
                continue;
            }

            match self.install(&plugin, &decl, scope.clone()) {
                Ok(backend) => added.push(HookBinding {
                    plugin: Arc::clone(&plugin),
                    member: decl.member,
                    scope: scope.clone(),
                    point: decl.point,
                    backend,
                }),
                Err(err) => {
                    for binding in added.iter() {
                        self.uninstall(binding);
                    }
                    return Err(err);
                }
            }
        }

        if !added.is_empty() {
            info!(
                plugin = %plugin.name(),
                scope = ?scope,
                hooks = added.len(),
                "bound plugin hooks"
            );
        }
        bindings.extend(added);

        Ok(bindings.iter().filter(|b| b.is_instance(key)).cloned().collect())
    }

    /// Destroy every binding of `plugin`. Returns how many were removed.
    pub fn unbind(&self, plugin: &Arc<dyn Hookable>) -> usize {
        let key = instance_key(plugin);
        self.remove_where(|b| b.is_instance(key))
    }

    /// Destroy every binding made in `scope`, e.g. when its loader goes away.
    pub fn unbind_scope(&self, scope: &LoaderScope) -> usize {
        self.remove_where(|b| b.scope.as_ref() == Some(scope))
    }

    pub fn bindings(&self) -> Vec<HookBinding> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&HookBinding) -> bool,
    {
        let mut bindings = self.lock();
        let (removed, kept): (Vec<HookBinding>, Vec<HookBinding>) =
            bindings.drain(..).partition(|b| pred(b));
        *bindings = kept;
        drop(bindings);

        for binding in removed.iter() {
            self.uninstall(binding);
            debug!(
                plugin = %binding.plugin.name(),
                member = %binding.member,
                "unbound hook"
            );
        }
        removed.len()
    }

    fn validate(&self, plugin: &str, decl: &HookDecl) -> Result<()> {
        if decl.target == HookTarget::Field {
            return Err(HotswapError::InvalidHook {
                plugin: plugin.to_string(),
                member: decl.member.clone(),
                reason: "hooks must be declared on methods, not fields".to_string(),
            });
        }
        if decl.member.trim().is_empty() {
            return Err(HotswapError::InvalidHook {
                plugin: plugin.to_string(),
                member: decl.member.clone(),
                reason: "member name is empty".to_string(),
            });
        }
        if matches!(decl.point, HookPoint::ResourceChange { .. }) && self.notifiers.is_none() {
            return Err(HotswapError::UnsupportedHookPoint {
                plugin: plugin.to_string(),
                member: decl.member.clone(),
                point: decl.point.to_string(),
            });
        }
        compile(decl.point.pattern())?;
        Ok(())
    }

    fn install(
        &self,
        plugin: &Arc<dyn Hookable>,
        decl: &HookDecl,
        scope: Option<LoaderScope>,
    ) -> Result<HookBackend> {
        let label = format!("{}::{}", plugin.name(), decl.member);
        match &decl.point {
            HookPoint::ClassLoad { pattern, phases } => {
                let transformer = HookTransformer {
                    plugin: Arc::clone(plugin),
                    member: decl.member.clone(),
                    label,
                    phases: *phases,
                };
                let id = self.registry.register(scope, pattern, Arc::new(transformer))?;
                Ok(HookBackend::Transformer(id))
            }
            HookPoint::ResourceChange { pattern } => {
                let Some(hub) = &self.notifiers else {
                    return Err(HotswapError::UnsupportedHookPoint {
                        plugin: plugin.name().to_string(),
                        member: decl.member.clone(),
                        point: decl.point.to_string(),
                    });
                };
                let listener = HookListener {
                    plugin: Arc::clone(plugin),
                    member: decl.member.clone(),
                    label,
                    scope,
                    pattern: compile(pattern)?,
                };
                Ok(HookBackend::Listener(hub.add(Arc::new(listener))))
            }
        }
    }

    fn uninstall(&self, binding: &HookBinding) {
        match binding.backend {
            HookBackend::Transformer(id) => {
                self.registry.remove(id);
            }
            HookBackend::Listener(id) => match &self.notifiers {
                Some(hub) => {
                    hub.remove(id);
                }
                None => warn!(id = %id, "listener binding without a notifier hub"),
            },
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| HotswapError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
