// Deterministic planning kernel library entry point

pub mod internal {
    pub mod actions {
        pub mod builtin;
        pub mod manifest;
        pub mod spec;
    }
    pub mod plan {
        pub mod clock;
        pub mod ir;
        pub mod planner;
    }
    pub mod exec {
        pub mod constraints;
    }
    pub mod kernel {
        pub mod admissibility;
        pub mod context;
        pub mod failures;
        pub mod hashing;
        pub mod sandbox;
    }
    pub mod provenance {
        pub mod ledger;
        pub mod store;
    }
    pub mod config;
    pub mod registry;
}

// Re-export key types for external use
pub use internal::actions::spec::{ActionContract, ActionDescriptor, ActionError, ActionOrigin};
pub use internal::config::{Config, ConfigError, ResourceTier};
pub use internal::exec::constraints::{Budget, BudgetStatus, ConstraintChecker};
pub use internal::kernel::admissibility::{evaluate, NodeResolver, RefusalMode, Verdict};
pub use internal::kernel::context::{ContextError, KernelContext, RunIdSource};
pub use internal::kernel::failures::{CrashKind, KernelCrash};
pub use internal::kernel::hashing::{canonicalize, hash_object, HashError};
pub use internal::kernel::sandbox::SandboxViolation;
pub use internal::plan::clock::{MonotonicClock, SteppingClock, SystemClock};
pub use internal::plan::ir::{ActionSpec, Plan, PlanMeta, PlanValidationError};
pub use internal::plan::planner::{plan, KeywordStrategy, PlanError, Planner, SelectionStrategy};
pub use internal::provenance::ledger::{AppendOutcome, Ledger, LedgerError, LedgerEvent, GENESIS_HASH};
pub use internal::registry::{discover, ActionCatalog, RegistryError};
