//! Module registry and lazy module slots.
//!
//! Modules are created from [ModuleArgs] through a per-kind [Registry] keyed by the
//! `type` name. A [LazyModule] holds either the arguments of a module that has not
//! been needed yet or the created instance.

use log::debug;
use std::collections::HashMap;
use std::fmt;

use crate::common::{
    BoundingVolume, GeneratorUpdater, PlanningError, PlanningResult, SegmentSelector, TrajectoryEvaluator,
    TrajectoryGenerator,
};
use crate::config::ModuleArgs;
use crate::evaluators::{RrtStarEvaluatorAdapter, SimpleEvaluator};
use crate::generators::{Rrt, RrtStar};
use crate::modules::bounding_volume::{BoundingBox, Unbounded};
use crate::modules::generator_updaters::{RecheckCollision, ResetTree, UpdateNothing};
use crate::modules::segment_selectors::{GreedySelector, RandomWeightedSelector, RootSelector};
use crate::modules::system_constraints::SystemConstraints;

/// Builds a module from its arguments; nested modules are created through the factory.
pub type Constructor<T> = fn(&ModuleArgs, &ModuleFactory) -> PlanningResult<Box<T>>;

/// Constructors of one module kind
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    default_type: &'static str,
    constructors: HashMap<String, Constructor<T>>,
}

impl<T: ?Sized> Registry<T> {
    fn new(kind: &'static str, default_type: &'static str) -> Self {
        Registry {
            kind,
            default_type,
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: &str, constructor: Constructor<T>) {
        self.constructors.insert(type_name.to_string(), constructor);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, args: &ModuleArgs) -> PlanningResult<(&str, Constructor<T>)> {
        let type_name = args.type_name().unwrap_or(self.default_type);
        self.constructors
            .get_key_value(type_name)
            .map(|(name, constructor)| (name.as_str(), *constructor))
            .ok_or_else(|| PlanningError::UnknownModule {
                kind: self.kind,
                type_name: type_name.to_string(),
            })
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("default_type", &self.default_type)
            .field("types", &self.type_names())
            .finish()
    }
}

/// Module kinds that can be created by the [ModuleFactory]
pub trait FactoryModule {
    fn registry(factory: &ModuleFactory) -> &Registry<Self>;

    fn registry_mut(factory: &mut ModuleFactory) -> &mut Registry<Self>;
}

macro_rules! factory_module {
    ($module:ty, $field:ident) => {
        impl FactoryModule for $module {
            fn registry(factory: &ModuleFactory) -> &Registry<Self> {
                &factory.$field
            }

            fn registry_mut(factory: &mut ModuleFactory) -> &mut Registry<Self> {
                &mut factory.$field
            }
        }
    };
}

factory_module!(dyn TrajectoryGenerator, generators);
factory_module!(dyn TrajectoryEvaluator, evaluators);
factory_module!(dyn SegmentSelector, selectors);
factory_module!(dyn GeneratorUpdater, updaters);
factory_module!(dyn BoundingVolume, bounding_volumes);
factory_module!(SystemConstraints, system_constraints);

/// Creates modules by type name
#[derive(Debug)]
pub struct ModuleFactory {
    generators: Registry<dyn TrajectoryGenerator>,
    evaluators: Registry<dyn TrajectoryEvaluator>,
    selectors: Registry<dyn SegmentSelector>,
    updaters: Registry<dyn GeneratorUpdater>,
    bounding_volumes: Registry<dyn BoundingVolume>,
    system_constraints: Registry<SystemConstraints>,
}

impl Default for ModuleFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModuleFactory {
    /// Factory without any registered module
    pub fn empty() -> Self {
        ModuleFactory {
            generators: Registry::new("trajectory generator", "rrt_star"),
            evaluators: Registry::new("trajectory evaluator", "simple"),
            selectors: Registry::new("segment selector", "root"),
            updaters: Registry::new("generator updater", "update_nothing"),
            bounding_volumes: Registry::new("bounding volume", "unbounded"),
            system_constraints: Registry::new("system constraints", "default"),
        }
    }

    /// Factory with all built-in modules registered
    pub fn with_defaults() -> Self {
        let mut factory = Self::empty();
        factory.register::<dyn TrajectoryGenerator>("rrt", Rrt::create);
        factory.register::<dyn TrajectoryGenerator>("rrt_star", RrtStar::create);
        factory.register::<dyn TrajectoryEvaluator>("simple", SimpleEvaluator::create);
        factory.register::<dyn TrajectoryEvaluator>("rrt_star_adapter", RrtStarEvaluatorAdapter::create);
        factory.register::<dyn SegmentSelector>("root", RootSelector::create);
        factory.register::<dyn SegmentSelector>("greedy", GreedySelector::create);
        factory.register::<dyn SegmentSelector>("random_weighted", RandomWeightedSelector::create);
        factory.register::<dyn GeneratorUpdater>("update_nothing", UpdateNothing::create);
        factory.register::<dyn GeneratorUpdater>("reset_tree", ResetTree::create);
        factory.register::<dyn GeneratorUpdater>("recheck_collision", RecheckCollision::create);
        factory.register::<dyn BoundingVolume>("unbounded", Unbounded::create);
        factory.register::<dyn BoundingVolume>("box", BoundingBox::create);
        factory.register::<SystemConstraints>("default", SystemConstraints::create);
        factory
    }

    pub fn register<T: ?Sized + FactoryModule>(&mut self, type_name: &str, constructor: Constructor<T>) {
        T::registry_mut(self).register(type_name, constructor);
    }

    pub fn registry<T: ?Sized + FactoryModule>(&self) -> &Registry<T> {
        T::registry(self)
    }

    /// Create a module of kind `T` from `args`.
    ///
    /// # Errors
    ///
    /// If the type is not registered or the module rejects its arguments.
    pub fn create<T: ?Sized + FactoryModule>(&self, args: &ModuleArgs) -> PlanningResult<Box<T>> {
        let registry = T::registry(self);
        let (type_name, constructor) = registry.resolve(args)?;
        debug!("[ModuleFactory] creating {} '{}'", registry.kind, type_name);
        constructor(args, self)
    }

    /// Check that `args` name a registered type without creating the module.
    pub fn check<T: ?Sized + FactoryModule>(&self, args: &ModuleArgs) -> PlanningResult<()> {
        T::registry(self).resolve(args).map(|_| ())
    }
}

/// Module slot that is created on first use
pub enum LazyModule<T: ?Sized + FactoryModule> {
    Pending(ModuleArgs),
    Resolved(Box<T>),
}

impl<T: ?Sized + FactoryModule> LazyModule<T> {
    /// Validate the arguments now, create the module later.
    ///
    /// # Errors
    ///
    /// If `args` do not name a registered type.
    pub fn pending(args: ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Self> {
        factory.check::<T>(&args)?;
        Ok(LazyModule::Pending(args))
    }

    pub fn resolved(module: Box<T>) -> Self {
        LazyModule::Resolved(module)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, LazyModule::Resolved(_))
    }

    /// Module instance, created through `factory` the first time it is requested.
    pub fn get_or_create(&mut self, factory: &ModuleFactory) -> PlanningResult<&mut T> {
        if let LazyModule::Pending(args) = self {
            let module = factory.create::<T>(args)?;
            *self = LazyModule::Resolved(module);
        }
        match self {
            LazyModule::Resolved(module) => Ok(module.as_mut()),
            LazyModule::Pending(_) => Err(PlanningError::Config("module slot left unresolved".to_string())),
        }
    }
}

impl<T: ?Sized + FactoryModule> fmt::Debug for LazyModule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyModule::Pending(args) => f.debug_tuple("Pending").field(&args.type_name()).finish(),
            LazyModule::Resolved(_) => f.write_str("Resolved"),
        }
    }
}
