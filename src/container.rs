//! Dependency injection container.
//!
//! The container maps an abstract identifier ([`Key`]) to either a ready-made
//! instance or a factory. Keys are Rust types (`Key::of::<T>()`) or plain
//! string names (`Key::from("cache")`), and an alias can point one key at
//! another.
//!
//! Resolution order for a key:
//!
//! ```text
//! alias (one hop) → instances → bindings → Injectable::build (typed keys only)
//! ```
//!
//! Registration needs `&mut Container` and happens once at boot. After that
//! the container is shared as `Arc<Container>` and only read; the one write
//! left is the first resolution of a shared binding, which memoizes its value
//! in a [`OnceCell`]. Concurrent first resolutions of the same singleton block
//! on the cell and observe a single instance.

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::ContainerError;

/// A resolved value, type-erased.
pub type Shared = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Container) -> Result<Shared, ContainerError> + Send + Sync>;

// ── Key ───────────────────────────────────────────────────────────────────────

/// An abstract identifier: a Rust type or a string name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Type { id: TypeId, name: &'static str },
    Name(Cow<'static, str>),
}

impl Key {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type { id: TypeId::of::<T>(), name: type_name::<T>() }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Name(name.into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.write_str(name),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => write!(f, "Key::Type({name})"),
            Self::Name(name) => write!(f, "Key::Name({name:?})"),
        }
    }
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

// ── Injectable ────────────────────────────────────────────────────────────────

/// A type the container can construct on its own.
///
/// `build` plays the constructor: it pulls every dependency out of the
/// container and fails with the first one it cannot get.
///
/// ```rust
/// use std::sync::Arc;
/// use lintel::{Container, ContainerError, Injectable};
///
/// struct Clock;
/// impl Injectable for Clock {
///     fn build(_: &Container) -> Result<Self, ContainerError> { Ok(Clock) }
/// }
///
/// struct Greeter { clock: Arc<Clock>, greeting: String }
/// impl Injectable for Greeter {
///     fn build(c: &Container) -> Result<Self, ContainerError> {
///         Ok(Greeter {
///             clock: c.resolve()?,
///             greeting: c.scalar("Greeter", "greeting", Some("Hello".to_owned()))?,
///         })
///     }
/// }
///
/// let container = Container::new();
/// let greeter = container.resolve::<Greeter>().unwrap();
/// assert_eq!(greeter.greeting, "Hello");
/// ```
///
/// Abstract handles (for instance `Arc<dyn Store>`) implement the trait with
/// an empty body: the default `build` refuses with
/// [`ContainerError::NotInstantiable`], so such types resolve only when
/// something was bound to them.
pub trait Injectable: Any + Send + Sync + Sized {
    fn build(_container: &Container) -> Result<Self, ContainerError> {
        Err(ContainerError::NotInstantiable { target: type_name::<Self>().to_owned() })
    }
}

// ── Binding ───────────────────────────────────────────────────────────────────

struct Binding {
    factory: Factory,
    shared: bool,
    instance: OnceCell<Shared>,
}

impl Binding {
    fn new(factory: Factory, shared: bool) -> Self {
        Self { factory, shared, instance: OnceCell::new() }
    }

    fn produce(&self, container: &Container) -> Result<Shared, ContainerError> {
        if self.shared {
            self.instance.get_or_try_init(|| (self.factory)(container)).cloned()
        } else {
            (self.factory)(container)
        }
    }
}

// ── Container ─────────────────────────────────────────────────────────────────

/// The dependency injection container.
#[derive(Default)]
pub struct Container {
    bindings: HashMap<Key, Binding>,
    instances: HashMap<Key, Shared>,
    aliases: HashMap<Key, Key>,
}

impl Container {
    pub fn new() -> Self {
        debug!("creating dependency container");
        Self::default()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Binds `T` to a factory. Every resolution calls the factory again.
    pub fn bind<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert_binding(Key::of::<T>(), erase(factory), false)
    }

    /// Binds `T` to a factory that runs at most once per container.
    pub fn singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert_binding(Key::of::<T>(), erase(factory), true)
    }

    /// Binds `T` to its own [`Injectable::build`]. With `shared` set, the
    /// first instance is kept for the lifetime of the container.
    pub fn bind_self<T: Injectable>(&mut self, shared: bool) -> &mut Self {
        self.insert_binding(Key::of::<T>(), erase(T::build), shared)
    }

    /// Named form of [`bind`](Self::bind) / [`singleton`](Self::singleton).
    pub fn bind_named<T, F>(&mut self, name: impl Into<Key>, factory: F, shared: bool) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.insert_binding(name.into(), erase(factory), shared)
    }

    /// Stores an already-built value as the singleton for `T`.
    pub fn instance<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.insert_instance(Key::of::<T>(), Arc::new(value))
    }

    /// Stores an already-built value under a string name.
    pub fn instance_named<T: Any + Send + Sync>(&mut self, name: impl Into<Key>, value: T) -> &mut Self {
        self.insert_instance(name.into(), Arc::new(value))
    }

    /// Makes `alias` resolve as `target`. Aliases are one hop deep; an alias
    /// pointing at another alias is not followed further.
    pub fn alias(&mut self, alias: impl Into<Key>, target: impl Into<Key>) -> &mut Self {
        let (alias, target) = (alias.into(), target.into());
        debug!(%alias, %target, "alias registered");
        self.aliases.insert(alias, target);
        self
    }

    fn insert_binding(&mut self, key: Key, factory: Factory, shared: bool) -> &mut Self {
        debug!(%key, shared, "binding registered");
        self.instances.remove(&key);
        self.bindings.insert(key, Binding::new(factory, shared));
        self
    }

    fn insert_instance(&mut self, key: Key, value: Shared) -> &mut Self {
        debug!(%key, "instance registered");
        self.bindings.remove(&key);
        self.instances.insert(key, value);
        self
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Whether `key` is bound, instanced or aliased.
    pub fn has(&self, key: &Key) -> bool {
        self.bindings.contains_key(key) || self.instances.contains_key(key) || self.aliases.contains_key(key)
    }

    /// Number of distinct identifiers known to the container: bindings,
    /// instances and alias targets.
    pub fn count(&self) -> usize {
        self.bindings
            .keys()
            .chain(self.instances.keys())
            .chain(self.aliases.values())
            .collect::<HashSet<_>>()
            .len()
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    /// Resolves `T`, building it through [`Injectable::build`] when nothing
    /// is registered for it.
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>, ContainerError> {
        let key = Key::of::<T>();
        match self.lookup(&key)? {
            Some((key, value)) => downcast(&key, value),
            None => self.build::<T>().map(Arc::new),
        }
    }

    /// Resolves a string-named identifier. There is nothing to build from a
    /// bare name, so an unknown name is [`ContainerError::NotInstantiable`],
    /// naming the alias target when `name` is an alias.
    pub fn resolve_named<T: Any + Send + Sync>(&self, name: impl Into<Key>) -> Result<Arc<T>, ContainerError> {
        let key = name.into();
        match self.lookup(&key)? {
            Some((key, value)) => downcast(&key, value),
            None => {
                let target = self.aliases.get(&key).unwrap_or(&key);
                Err(ContainerError::NotInstantiable { target: target.to_string() })
            }
        }
    }

    /// Constructs a fresh `T`, ignoring any binding registered for it.
    pub fn build<T: Injectable>(&self) -> Result<T, ContainerError> {
        let _guard = ResolvingGuard::enter(Key::of::<T>())?;
        trace!(target_type = type_name::<T>(), "auto-building");
        T::build(self)
    }

    /// Resolves a primitive constructor parameter.
    ///
    /// Looks for a value registered under the name `parameter`, then falls
    /// back to `default`. With neither, fails with
    /// [`ContainerError::DependencyResolution`] naming `target` and
    /// `parameter`.
    pub fn scalar<T>(&self, target: &str, parameter: &'static str, default: Option<T>) -> Result<T, ContainerError>
    where
        T: Any + Clone + Send + Sync,
    {
        let key = Key::from(parameter);
        if let Some((key, value)) = self.lookup(&key)? {
            return downcast::<T>(&key, value).map(|v| (*v).clone());
        }
        default.ok_or_else(|| ContainerError::DependencyResolution {
            target: target.to_owned(),
            parameter: parameter.to_owned(),
        })
    }

    /// Follows the alias, then checks instances and bindings. `Ok(None)`
    /// means the key is unknown.
    fn lookup(&self, key: &Key) -> Result<Option<(Key, Shared)>, ContainerError> {
        let key = self.aliases.get(key).unwrap_or(key);

        if let Some(value) = self.instances.get(key) {
            trace!(%key, "resolved instance");
            return Ok(Some((key.clone(), Arc::clone(value))));
        }

        let Some(binding) = self.bindings.get(key) else {
            return Ok(None);
        };

        let _guard = ResolvingGuard::enter(key.clone())?;
        let value = binding.produce(self)?;
        trace!(%key, shared = binding.shared, "resolved binding");
        Ok(Some((key.clone(), value)))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
{
    Arc::new(move |c: &Container| factory(c).map(|v| Arc::new(v) as Shared))
}

fn downcast<T: Any + Send + Sync>(key: &Key, value: Shared) -> Result<Arc<T>, ContainerError> {
    value.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

// ── Cycle detection ───────────────────────────────────────────────────────────

// Factories are synchronous, so the chain of keys under construction is a
// per-thread stack. Re-entering a key would otherwise recurse forever, or
// deadlock inside the singleton's OnceCell.
thread_local! {
    static RESOLVING: RefCell<Vec<Key>> = const { RefCell::new(Vec::new()) };
}

struct ResolvingGuard;

impl ResolvingGuard {
    fn enter(key: Key) -> Result<Self, ContainerError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&key) {
                let chain = stack
                    .iter()
                    .chain(std::iter::once(&key))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ContainerError::CircularDependency { target: key.to_string(), chain });
            }
            stack.push(key);
            Ok(Self)
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
