pub mod auth;
pub mod budget;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod freshness;
pub mod metrics;
pub mod scoring;
pub mod store;
pub mod strategy;
pub mod testing;
pub mod upstream;

pub use auth::{
    create_authenticator, validate_user_id, ApiKeyAuthenticator, AuthError, AuthRequest,
    Authenticator, Identity, NoneAuthenticator,
};
pub use budget::{BudgetConfig, BudgetSnapshot, BudgetState, GateError, RateBudget, UpstreamGate};
pub use cache::{
    AnalysisCache, CacheConfig, CacheError, CacheStats, CachedAnalysis, SqliteAnalysisCache,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, DatabaseConfig, GitHubConfig, RetentionConfig, SanitizedConfig, ServerConfig,
};
pub use discovery::{
    CleanupReport, DiscoveryConfig, DiscoveryDiagnostics, DiscoveryError, DiscoveryOrchestrator,
    DiscoveryRequest, EngineDiagnostics, FilterConfig, RankedRepository, RankedResult,
    RepositoryAnalysis, StopReason,
};
pub use freshness::FreshnessFilter;
pub use scoring::{ScoreBreakdown, ScoringConfig, SuitabilityScorer, Verdict};
pub use store::{
    SeenRecord, SqliteUserStateStore, StoreError, UserReset, UserStateStore, UserStats,
};
pub use strategy::{SearchCursor, SearchStrategyRotator, StrategyConfig, StrategyStatus};
pub use upstream::{
    GitHubClient, RepoId, RepositoryCandidate, UpstreamClient, UpstreamError, UpstreamResponse,
};
