use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use reconcile::{ServiceSpec, UpdatePolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skiff")]
#[command(version)]
#[command(about = "Deploy container services to remote swarm machines", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Machine registry file
    #[arg(long, global = true, env = "SKIFF_REGISTRY", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Machine to run against (defaults to the one chosen with `machine use`)
    #[arg(long, global = true, value_name = "NAME")]
    pub machine: Option<String>,

    /// Run docker commands on this host instead of over SSH
    #[arg(long, global = true)]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage services
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Show the current state of a service
    Inspect(InspectArgs),

    /// Fetch the logs of a service
    Logs(LogsArgs),

    /// Manage machines
    #[command(subcommand)]
    Machine(MachineCommand),

    /// Manage networks
    #[command(subcommand)]
    Network(NetworkCommand),

    /// Manage volumes
    #[command(subcommand)]
    Volume(VolumeCommand),

    /// Run and follow one-off tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage secrets
    #[command(subcommand)]
    Secret(SecretCommand),

    /// Log the machine into an image registry
    Login(LoginArgs),

    /// Log the machine out of an image registry
    Logout {
        /// Registry server (defaults to Docker Hub)
        #[arg(long)]
        registry: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Service Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Create or update a service to match the given flags
    Run(ServiceRunArgs),

    /// Pull the image again and restart every task
    Redeploy {
        /// Service name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Delete a service
    #[command(visible_alias = "rm")]
    Delete {
        /// Service name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List services deployed by skiff
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServiceRunArgs {
    /// Service name
    pub name: String,

    /// Image reference, e.g. nginx:1.27
    pub image: String,

    /// Command and arguments run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Environment variable (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Run an init process inside each container
    #[arg(long)]
    pub init: bool,

    /// Attach to a network (repeatable)
    #[arg(long = "network", value_name = "NAME")]
    pub networks: Vec<String>,

    /// Publish a port (repeatable)
    #[arg(short, long = "publish", value_name = "TARGET:PUBLISHED")]
    pub publish: Vec<String>,

    /// Number of tasks
    #[arg(long, default_value_t = 1)]
    pub replicas: u64,

    /// Expose a secret (repeatable)
    #[arg(long = "secret", value_name = "NAME")]
    pub secrets: Vec<String>,

    /// Delay between task updates, e.g. 10s or 1m30s
    #[arg(long, value_name = "DURATION")]
    pub update_delay: Option<String>,

    /// Action when an update fails
    #[arg(long, value_parser = ["continue", "pause", "rollback"])]
    pub update_failure_action: Option<String>,

    /// Whether new tasks start before old ones stop
    #[arg(long, value_parser = ["start-first", "stop-first"])]
    pub update_order: Option<String>,

    /// Tasks updated at once (0 updates all)
    #[arg(long, value_name = "N")]
    pub update_parallelism: Option<u64>,

    /// User to run as, `""` for the image default
    #[arg(long)]
    pub user: Option<String>,

    /// Working directory, `""` for the image default
    #[arg(long)]
    pub workdir: Option<String>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

impl ServiceRunArgs {
    pub fn to_spec(&self) -> ServiceSpec {
        ServiceSpec {
            name: self.name.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            env: self.env.clone(),
            init: self.init,
            mounts: Vec::new(),
            networks: self.networks.clone(),
            publish: self.publish.clone(),
            replicas: self.replicas,
            secrets: self.secrets.clone(),
            update: UpdatePolicy {
                delay: self.update_delay.clone(),
                failure_action: self.update_failure_action.clone(),
                order: self.update_order.clone(),
                parallelism: self.update_parallelism,
            },
            user: self.user.clone(),
            workdir: self.workdir.clone(),
        }
    }
}

#[derive(Args)]
pub struct InspectArgs {
    /// Service name
    pub name: String,

    /// Print the raw inspection document
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Service name
    pub name: String,

    #[command(flatten)]
    pub options: LogOptions,
}

/// Flags shared by `logs` and `task logs`.
#[derive(Args, Debug, Clone)]
pub struct LogOptions {
    /// Keep streaming new output
    #[arg(short, long)]
    pub follow: bool,

    /// Number of lines to show from the end
    #[arg(long, value_name = "N")]
    pub tail: Option<u64>,

    /// Show timestamps
    #[arg(short, long)]
    pub timestamps: bool,

    /// Stop following after this long
    #[arg(long, default_value = "1h", value_name = "DURATION")]
    pub timeout: String,
}

// ============================================================================
// Machine Commands
// ============================================================================

#[derive(Subcommand)]
pub enum MachineCommand {
    /// Register a machine and prepare it for deployments
    Add {
        /// Name to refer to the machine by
        name: String,

        /// Host name or IP address
        address: String,

        /// SSH user
        user: String,

        /// Path to the SSH private key
        key: String,

        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List registered machines
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Set the default machine
    Use {
        /// Machine name
        name: String,
    },

    /// Forget a machine (the machine itself is left untouched)
    #[command(visible_alias = "rm")]
    Delete {
        /// Machine name
        name: String,
    },
}

// ============================================================================
// Network Commands
// ============================================================================

#[derive(Subcommand)]
pub enum NetworkCommand {
    /// Create an attachable overlay network
    Add {
        /// Network name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Delete a network
    #[command(visible_alias = "rm")]
    Delete {
        /// Network name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List networks created by skiff
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Volume Commands
// ============================================================================

#[derive(Subcommand)]
pub enum VolumeCommand {
    /// Create a volume
    Add(VolumeAddArgs),

    /// Delete a volume
    #[command(visible_alias = "rm")]
    Delete {
        /// Volume name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Print a volume's inspection document
    Inspect {
        /// Volume name
        name: String,
    },

    /// List volumes created by skiff
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct VolumeAddArgs {
    /// Volume name
    pub name: String,

    /// Cluster volume availability
    #[arg(long, value_parser = ["active", "pause", "drain"])]
    pub availability: Option<String>,

    /// Volume driver
    #[arg(long)]
    pub driver: Option<String>,

    /// Cluster volume group
    #[arg(long)]
    pub group: Option<String>,

    /// Maximum size of a cluster volume in bytes
    #[arg(long, value_name = "BYTES")]
    pub limit_bytes: Option<String>,

    /// Driver specific option (repeatable)
    #[arg(long = "opt", value_name = "KEY=VALUE")]
    pub opts: Vec<String>,

    /// Minimum size of a cluster volume in bytes
    #[arg(long, value_name = "BYTES")]
    pub required_bytes: Option<String>,

    /// Cluster volume access sharing
    #[arg(long, value_parser = ["none", "readonly", "onewriter", "all"])]
    pub sharing: Option<String>,

    /// Cluster volume access scope
    #[arg(long, value_parser = ["single", "multi"])]
    pub scope: Option<String>,

    /// Cluster volume access type
    #[arg(long = "type", value_parser = ["mount", "block"])]
    pub access_type: Option<String>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

// ============================================================================
// Task Commands
// ============================================================================

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Run a command once on the swarm
    Run(TaskRunArgs),

    /// List task containers
    #[command(visible_alias = "ls")]
    List {
        /// Show the N most recently created containers, in any state
        #[arg(short = 'n', long, value_name = "N")]
        last: Option<u64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch the logs of a task container
    Logs(TaskLogsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TaskRunArgs {
    /// Image reference
    pub image: String,

    /// Command and arguments run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Network to attach to (empty for none)
    #[arg(long, default_value = "default", value_name = "NAME")]
    pub network: String,

    /// Publish a port (repeatable)
    #[arg(short, long = "publish", value_name = "TARGET:PUBLISHED")]
    pub publish: Vec<String>,

    /// Number of tasks
    #[arg(long, default_value_t = 1)]
    pub replicas: u64,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct TaskLogsArgs {
    /// Container ID
    pub id: String,

    #[command(flatten)]
    pub options: LogOptions,
}

// ============================================================================
// Secret Commands
// ============================================================================

#[derive(Subcommand)]
pub enum SecretCommand {
    /// Delete a secret
    #[command(visible_alias = "rm")]
    Delete {
        /// Secret name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List secrets created by skiff
    #[command(visible_alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Registry Login
// ============================================================================

#[derive(Args)]
pub struct LoginArgs {
    /// Registry username
    pub username: String,

    /// File holding the password or token, `-` for stdin
    pub password_file: String,

    /// Registry server (defaults to Docker Hub)
    #[arg(long)]
    pub registry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_service_run_parses_trailing_command() {
        let cli = Cli::try_parse_from([
            "skiff", "service", "run", "--env", "A=1", "-p", "80:8080", "--replicas", "2", "web",
            "python:3.12", "python3", "-m", "http.server", "80",
        ])
        .unwrap();
        let Command::Service(ServiceCommand::Run(args)) = cli.command else {
            panic!("expected service run");
        };
        let spec = args.to_spec();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.image, "python:3.12");
        assert_eq!(spec.command, vec!["python3", "-m", "http.server", "80"]);
        assert_eq!(spec.env, vec!["A=1"]);
        assert_eq!(spec.publish, vec!["80:8080"]);
        assert_eq!(spec.replicas, 2);
        assert_eq!(spec.user, None);
    }

    #[test]
    fn test_empty_user_is_explicit() {
        let cli = Cli::try_parse_from(["skiff", "service", "run", "--user", "", "web", "nginx"])
            .unwrap();
        let Command::Service(ServiceCommand::Run(args)) = cli.command else {
            panic!("expected service run");
        };
        assert_eq!(args.to_spec().user, Some(String::new()));
    }

    #[test]
    fn test_rejects_unknown_update_order() {
        assert!(
            Cli::try_parse_from([
                "skiff",
                "service",
                "run",
                "--update-order",
                "sideways",
                "web",
                "nginx"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_task_run_parses_trailing_command() {
        let cli = Cli::try_parse_from([
            "skiff", "task", "run", "-p", "80:80", "app:1.2", "./migrate", "--all",
        ])
        .unwrap();
        let Command::Task(TaskCommand::Run(args)) = cli.command else {
            panic!("expected task run");
        };
        assert_eq!(args.image, "app:1.2");
        assert_eq!(args.command, vec!["./migrate", "--all"]);
        assert_eq!(args.network, "default");
        assert_eq!(args.publish, vec!["80:80"]);
        assert_eq!(args.replicas, 1);
    }

    #[test]
    fn test_log_options_are_shared() {
        let cli = Cli::try_parse_from(["skiff", "task", "logs", "-f", "--tail", "5", "abc"]).unwrap();
        let Command::Task(TaskCommand::Logs(args)) = cli.command else {
            panic!("expected task logs");
        };
        assert_eq!(args.id, "abc");
        assert!(args.options.follow);
        assert_eq!(args.options.tail, Some(5));
        assert_eq!(args.options.timeout, "1h");
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["skiff", "-vv", "--machine", "prod", "machine", "list"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.machine.as_deref(), Some("prod"));
        assert!(matches!(
            cli.command,
            Command::Machine(MachineCommand::List { json: false })
        ));
    }
}
