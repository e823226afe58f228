// Colony
// Explicit context tying configuration, sessions, versions and the engine together

use crate::config::{ColonyConfig, ConfigValidator};
use crate::error::{ServiceError, ServiceResult};
use crate::execution::{
    BoundExecution, EngineConfig, Execution, ExecutionEngine, ExecutionGraph, ExecutionSet,
    ExecutionStreams, Module, UserVariables,
};
use crate::hooks::{HookEnvironment, HookRunner, ShellHookRunner};
use crate::runners::{RunnerFactory, TerraformCliConfig, TerraformCliFactory};
use crate::session::{IdGenerator, SessionRepo};
use crate::versions::{Installer, Platform, ReleasesInstaller, VersionCache, VersionResolver};

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Directory under `session_repo_dir` holding the session repository
pub const SESSION_REPO_DIR: &str = ".tfcolony";

/// A loaded colony ready to plan and apply
pub struct Colony {
    config: ColonyConfig,
    modules: Vec<Arc<Module>>,
    sessions: SessionRepo,
    versions: Arc<VersionResolver>,
    runners: Arc<dyn RunnerFactory>,
    engine_config: EngineConfig,
}

impl Colony {
    pub fn builder(config: ColonyConfig) -> ColonyBuilder {
        ColonyBuilder::new(config)
    }

    pub fn config(&self) -> &ColonyConfig {
        &self.config
    }

    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn sessions(&self) -> &SessionRepo {
        &self.sessions
    }

    pub fn versions(&self) -> &VersionResolver {
        &self.versions
    }

    /// Executions for the named modules in configuration order
    ///
    /// An empty filter selects the whole colony.
    pub fn executions(&self, filter: &[String]) -> ServiceResult<ExecutionSet> {
        if let Some(unknown) = filter
            .iter()
            .find(|name| !self.modules.iter().any(|m| m.name() == name.as_str()))
        {
            return Err(ServiceError::UnknownModule(unknown.clone()));
        }

        Ok(self
            .modules
            .iter()
            .filter(|m| filter.is_empty() || filter.iter().any(|name| name == m.name()))
            .map(|m| Execution::new(m.clone()))
            .collect())
    }

    /// Dependency graph of the whole colony
    pub fn graph(&self) -> ServiceResult<ExecutionGraph<Execution>> {
        Ok(ExecutionGraph::build(self.executions(&[])?.into_vec())?)
    }

    /// Bind the selected executions, all or nothing
    pub fn bind(
        &self,
        filter: &[String],
        variables: &UserVariables,
    ) -> ServiceResult<Vec<BoundExecution>> {
        let bound = self.executions(filter)?.bind_all(variables)?;
        tracing::debug!(count = bound.len(), "bound executions");
        Ok(bound)
    }

    /// Engine running against the current session
    pub fn engine(&self) -> ServiceResult<ExecutionEngine> {
        let session = self.sessions.current()?;
        Ok(ExecutionEngine::new(
            session,
            self.versions.clone(),
            self.runners.clone(),
            self.engine_config.clone(),
        ))
    }

    /// Plan the selected modules concurrently
    pub fn plan(
        &self,
        filter: &[String],
        variables: &UserVariables,
        detach: bool,
        cancel: CancellationToken,
    ) -> ServiceResult<ExecutionStreams> {
        let bound = self.bind(filter, variables)?;
        Ok(self.engine()?.plan_all(bound, detach, cancel))
    }

    /// Apply the selected modules
    ///
    /// Without a filter the whole colony is applied in dependency order. A
    /// filter applies just those modules concurrently, with no ordering
    /// between them.
    pub fn apply(
        &self,
        filter: &[String],
        variables: &UserVariables,
        cancel: CancellationToken,
    ) -> ServiceResult<ExecutionStreams> {
        let bound = self.bind(filter, variables)?;
        if filter.is_empty() {
            let graph = ExecutionGraph::build(bound)?;
            Ok(self.engine()?.apply_graph(graph, cancel)?)
        } else {
            tracing::warn!(modules = ?filter, "applying a module subset without dependency ordering");
            Ok(self.engine()?.apply_subset(bound, cancel)?)
        }
    }
}

/// Builder for [`Colony`] with replaceable collaborators
pub struct ColonyBuilder {
    config: ColonyConfig,
    runner_factory: Option<Arc<dyn RunnerFactory>>,
    installer: Option<Arc<dyn Installer>>,
    hook_runner: Option<Arc<dyn HookRunner>>,
    version_cache: Option<VersionCache>,
    platform: Option<Platform>,
    system_terraform: Option<Option<PathBuf>>,
    id_generator: Option<IdGenerator>,
}

impl ColonyBuilder {
    pub fn new(config: ColonyConfig) -> Self {
        Self {
            config,
            runner_factory: None,
            installer: None,
            hook_runner: None,
            version_cache: None,
            platform: None,
            system_terraform: None,
            id_generator: None,
        }
    }

    pub fn runner_factory(mut self, factory: Arc<dyn RunnerFactory>) -> Self {
        self.runner_factory = Some(factory);
        self
    }

    pub fn installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn hook_runner(mut self, hook_runner: Arc<dyn HookRunner>) -> Self {
        self.hook_runner = Some(hook_runner);
        self
    }

    pub fn version_cache(mut self, cache: VersionCache) -> Self {
        self.version_cache = Some(cache);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Fallback binary used when no version is configured
    pub fn system_terraform(mut self, binary: Option<PathBuf>) -> Self {
        self.system_terraform = Some(binary);
        self
    }

    pub fn id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Validate, check the dependency graph, open sessions and run startup hooks
    ///
    /// Nothing touches the filesystem until the configuration is known good.
    pub async fn build(self) -> ServiceResult<Colony> {
        ConfigValidator::validate(&self.config)?;

        let modules: Vec<Arc<Module>> = self
            .config
            .modules
            .iter()
            .map(|m| Arc::new(Module::from(m)))
            .collect();
        let unbound: Vec<Execution> = modules.iter().map(|m| Execution::new(m.clone())).collect();
        let graph = ExecutionGraph::build(unbound)?;
        tracing::debug!(
            modules = graph.len(),
            batches = graph.batches().len(),
            "dependency graph ok"
        );

        let mut sessions = SessionRepo::open(self.config.session_repo_dir.join(SESSION_REPO_DIR))?;
        if let Some(id_generator) = self.id_generator {
            sessions = sessions.with_id_generator(id_generator);
        }

        let cache = self.version_cache.unwrap_or_else(|| {
            VersionCache::new(
                self.config
                    .versions_dir
                    .clone()
                    .unwrap_or_else(VersionCache::default_root),
            )
        });
        let installer: Arc<dyn Installer> = match self.installer {
            Some(installer) => installer,
            None => Arc::new(ReleasesInstaller::new()),
        };
        let mut versions = VersionResolver::new(cache, installer)
            .with_default_version(self.config.terraform_version.clone());
        if let Some(platform) = self.platform {
            versions = versions.with_platform(platform);
        }
        if let Some(binary) = self.system_terraform {
            versions = versions.with_system_binary(binary);
        }

        let mut environment = HookEnvironment::new();
        if !self.config.hooks.startup.is_empty() {
            let hook_runner: Arc<dyn HookRunner> = match self.hook_runner {
                Some(hook_runner) => hook_runner,
                None => Arc::new(ShellHookRunner::new()),
            };
            let session = sessions.current()?;
            for command in &self.config.hooks.startup {
                let exported = hook_runner.run(command, session.dir(), &environment).await?;
                environment.extend(exported);
            }
        }

        let runners: Arc<dyn RunnerFactory> = match self.runner_factory {
            Some(factory) => factory,
            None => Arc::new(TerraformCliFactory::new(TerraformCliConfig {
                terminate_on_cancel: self.config.terminate_on_cancel,
            })),
        };

        tracing::info!(
            modules = modules.len(),
            repo = %sessions.root().display(),
            "colony ready"
        );

        Ok(Colony {
            engine_config: EngineConfig {
                max_parallel: self.config.max_parallel,
                environment,
            },
            config: self.config,
            modules,
            sessions,
            versions: Arc::new(versions),
            runners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleConfig, VariableConfig};
    use crate::execution::{BindError, ExecutionStatus, GraphError, SkipReason};
    use crate::runners::RunnerStep;
    use crate::test_support::{FakeHookRunner, FakeInstaller, FakeRunnerFactory};

    use std::path::Path;

    /// net <- db <- app
    fn config(root: &Path) -> ColonyConfig {
        ColonyConfig {
            session_repo_dir: root.to_path_buf(),
            modules: vec![
                ModuleConfig::new("net", root.join("src/net")),
                ModuleConfig::new("db", root.join("src/db")).with_dependencies(["net"]),
                ModuleConfig::new("app", root.join("src/app")).with_dependencies(["db"]),
            ],
            ..ColonyConfig::default()
        }
    }

    fn builder(config: ColonyConfig, runners: &FakeRunnerFactory) -> ColonyBuilder {
        let versions = config.session_repo_dir.join("versions");
        Colony::builder(config)
            .runner_factory(Arc::new(runners.clone()))
            .installer(Arc::new(FakeInstaller::new()))
            .version_cache(VersionCache::new(versions))
            .platform(Platform::new("linux", "amd64"))
            .system_terraform(Some(PathBuf::from("/usr/bin/terraform")))
    }

    fn filter(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_graph_batches() {
        let dir = tempfile::tempdir().unwrap();
        let colony = builder(config(dir.path()), &FakeRunnerFactory::new())
            .build()
            .await
            .unwrap();

        let snapshot = colony.graph().unwrap().snapshot();
        assert_eq!(
            snapshot.batches,
            vec![vec!["net".to_string()], vec!["db".to_string()], vec!["app".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.modules.push(ModuleConfig::new("net", dir.path().join("dup")));

        let err = builder(config, &FakeRunnerFactory::new())
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::Config(_)));
        assert!(!dir.path().join(SESSION_REPO_DIR).exists());
    }

    #[tokio::test]
    async fn test_module_name_cannot_leave_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config
            .modules
            .push(ModuleConfig::new("../../../escaped", dir.path().join("src/escaped")));
        let runners = FakeRunnerFactory::new();

        let err = builder(config, &runners).build().await.err().unwrap();

        assert!(matches!(err, ServiceError::Config(_)));
        assert!(err.to_string().contains("'../../../escaped'"));
        assert!(runners.calls().is_empty());
        assert!(!dir.path().join("escaped").exists());
    }

    #[tokio::test]
    async fn test_cycle_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.modules[0].dependencies = vec!["app".to_string()];

        let err = builder(config, &FakeRunnerFactory::new())
            .build()
            .await
            .err()
            .unwrap();
        match err {
            ServiceError::Graph(GraphError::CyclicDependency { cycle }) => {
                for module in ["net", "db", "app"] {
                    assert!(cycle.iter().any(|m| m == module));
                }
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join(SESSION_REPO_DIR).exists());
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.modules[2].dependencies.push("queue".to_string());

        let err = builder(config, &FakeRunnerFactory::new())
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ServiceError::Graph(GraphError::DependencyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_startup_hooks_run_in_session_dir_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.hooks.startup = vec!["first".to_string(), "second".to_string()];
        let hooks = Arc::new(FakeHookRunner::new());

        let colony = builder(config, &FakeRunnerFactory::new())
            .hook_runner(hooks.clone())
            .build()
            .await
            .unwrap();

        let session = colony.sessions().current().unwrap();
        let runs = hooks.runs();
        assert_eq!(
            runs,
            vec![
                ("first".to_string(), session.dir().to_path_buf()),
                ("second".to_string(), session.dir().to_path_buf()),
            ]
        );
    }

    #[tokio::test]
    async fn test_hook_exports_reach_later_hooks_and_terraform() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.hooks.startup = vec!["login".to_string(), "select".to_string()];
        let hooks = Arc::new(
            FakeHookRunner::new()
                .exporting("login", "AWS_PROFILE", "dev")
                .exporting("select", "TF_WORKSPACE", "blue"),
        );
        let runners = FakeRunnerFactory::new();

        let colony = builder(config, &runners)
            .hook_runner(hooks.clone())
            .build()
            .await
            .unwrap();

        let seen = hooks.environments();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].get("AWS_PROFILE").map(String::as_str), Some("dev"));

        colony
            .plan(&[], &UserVariables::none(), false, CancellationToken::new())
            .unwrap()
            .collect()
            .await;

        let targets = runners.targets();
        assert_eq!(targets.len(), 3);
        for target in targets {
            assert_eq!(target.environment.get("AWS_PROFILE").map(String::as_str), Some("dev"));
            assert_eq!(target.environment.get("TF_WORKSPACE").map(String::as_str), Some("blue"));
        }
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.hooks.startup = vec!["first".to_string(), "second".to_string()];
        let hooks = Arc::new(FakeHookRunner::failing_on("first"));

        let result = builder(config, &FakeRunnerFactory::new())
            .hook_runner(hooks.clone())
            .build()
            .await;

        assert!(matches!(result, Err(ServiceError::Hook(_))));
        assert_eq!(hooks.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_no_hooks_means_no_session_at_build() {
        let dir = tempfile::tempdir().unwrap();
        let colony = builder(config(dir.path()), &FakeRunnerFactory::new())
            .build()
            .await
            .unwrap();
        assert_eq!(colony.sessions().current_id().unwrap(), None);
    }

    #[tokio::test]
    async fn test_executions_filter() {
        let dir = tempfile::tempdir().unwrap();
        let colony = builder(config(dir.path()), &FakeRunnerFactory::new())
            .build()
            .await
            .unwrap();

        assert_eq!(colony.executions(&[]).unwrap().names(), vec!["net", "db", "app"]);
        assert_eq!(
            colony.executions(&filter(&["app", "net"])).unwrap().names(),
            vec!["net", "app"]
        );
        assert!(matches!(
            colony.executions(&filter(&["queue"])),
            Err(ServiceError::UnknownModule(name)) if name == "queue"
        ));
    }

    #[tokio::test]
    async fn test_apply_with_failing_root_skips_chain() {
        let dir = tempfile::tempdir().unwrap();
        let runners = FakeRunnerFactory::new().fail("net", RunnerStep::Apply);
        let colony = builder(config(dir.path()), &runners).build().await.unwrap();

        let (_, results) = colony
            .apply(&[], &UserVariables::none(), CancellationToken::new())
            .unwrap()
            .collect()
            .await;

        let status = |m: &str| {
            results
                .iter()
                .find(|r| r.module == m)
                .map(|r| r.status.clone())
                .unwrap()
        };
        assert!(matches!(status("net"), ExecutionStatus::Failed(_)));
        assert!(matches!(
            status("db"),
            ExecutionStatus::Skipped(SkipReason::DependencyFailed { .. })
        ));
        assert!(matches!(
            status("app"),
            ExecutionStatus::Skipped(SkipReason::DependencyFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_runs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let runners = FakeRunnerFactory::new();
        let colony = builder(config(dir.path()), &runners).build().await.unwrap();

        let (lines, results) = colony
            .plan(&[], &UserVariables::none(), false, CancellationToken::new())
            .unwrap()
            .collect()
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(runners.modules_with(RunnerStep::Plan).len(), 3);
        assert!(lines.iter().any(|l| l.module == "app"));
    }

    #[tokio::test]
    async fn test_apply_subset_runs_only_named_modules() {
        let dir = tempfile::tempdir().unwrap();
        let runners = FakeRunnerFactory::new();
        let colony = builder(config(dir.path()), &runners).build().await.unwrap();

        let (_, results) = colony
            .apply(&filter(&["app"]), &UserVariables::none(), CancellationToken::new())
            .unwrap()
            .collect()
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(runners.modules_with(RunnerStep::Apply), vec!["app".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_required_variable_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runners = FakeRunnerFactory::new();
        let mut config = config(dir.path());
        config.modules[1] = config.modules[1]
            .clone()
            .with_variable(VariableConfig::new("region").required());
        let colony = builder(config, &runners).build().await.unwrap();

        let err = colony
            .apply(&[], &UserVariables::none(), CancellationToken::new())
            .err()
            .unwrap();

        assert!(matches!(
            err,
            ServiceError::Bind(BindError::MissingRequiredVariable { ref module, ref variable })
                if module == "db" && variable == "region"
        ));
        assert!(runners.calls().is_empty());
        assert_eq!(colony.sessions().current_id().unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_variables_reach_runner() {
        let dir = tempfile::tempdir().unwrap();
        let runners = FakeRunnerFactory::new();
        let mut config = config(dir.path());
        config.modules[0] = config.modules[0].clone().with_variable(
            VariableConfig::new("region").with_values(["us-east-1", "us-west-2"]),
        );
        let colony = builder(config, &runners).build().await.unwrap();

        colony
            .plan(
                &filter(&["net"]),
                &UserVariables::none().with("region", "us-west-2"),
                false,
                CancellationToken::new(),
            )
            .unwrap()
            .collect()
            .await;

        let target = runners.targets().pop().unwrap();
        assert_eq!(target.variables.get("region").map(String::as_str), Some("us-west-2"));
        assert_eq!(target.binary, PathBuf::from("/usr/bin/terraform"));
    }
}
