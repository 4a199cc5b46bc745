//! Remote state reader
//!
//! Queries the orchestrator for a service's current configuration and
//! translates it into a [`ServiceState`] comparable with the desired one.
//! Every managed object carries the `skiff` label so listings only show
//! what this tool deployed.

use crate::error::{Error, Result};
use crate::pipeline::{Flow, Pipeline, skip_reset};
use crate::shell::ShellCommand;
use crate::transport::Transport;
use crate::types::{
    DEFAULT_UPDATE_FAILURE_ACTION, DEFAULT_UPDATE_ORDER, DEFAULT_UPDATE_PARALLELISM, ServiceState,
    delay_from_nanos, normalize_default, normalize_image,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Label key attached to every managed service and network.
pub const LABEL: &str = "skiff";
/// Label value marking managed services.
pub const SERVICE_LABEL: &str = "skiff=service";
/// Label carried by one-off tasks and their containers.
pub const TASK_LABEL: &str = "skiff=task";

// ============================================================================
// Inspection payloads
// ============================================================================

fn null_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One element of `docker service inspect --format json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServiceInspection {
    #[serde(rename = "ID")]
    pub id: String,
    pub spec: InspectedSpec,
    pub endpoint: InspectedEndpoint,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InspectedSpec {
    pub name: String,
    pub task_template: TaskTemplate,
    pub mode: ServiceMode,
    pub update_config: Option<UpdateConfig>,
    pub endpoint_spec: EndpointSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskTemplate {
    pub container_spec: ContainerSpec,
    #[serde(deserialize_with = "null_default")]
    pub networks: Vec<NetworkAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(deserialize_with = "null_default")]
    pub args: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub env: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub init: bool,
    #[serde(deserialize_with = "null_default")]
    pub secrets: Vec<SecretReference>,
    pub user: String,
    pub dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SecretReference {
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NetworkAttachment {
    pub target: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServiceMode {
    pub replicated: Option<ReplicatedMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReplicatedMode {
    pub replicas: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UpdateConfig {
    pub parallelism: Option<u64>,
    /// Nanoseconds
    pub delay: u64,
    pub failure_action: String,
    pub order: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EndpointSpec {
    #[serde(deserialize_with = "null_default")]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InspectedEndpoint {
    #[serde(deserialize_with = "null_default")]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PortConfig {
    pub protocol: String,
    pub target_port: u32,
    pub published_port: u32,
}

impl PortConfig {
    /// `target:published`, with `/proto` unless the protocol is tcp.
    pub fn render(&self) -> String {
        let mut out = format!("{}:{}", self.target_port, self.published_port);
        if !self.protocol.is_empty() && self.protocol != "tcp" {
            out.push('/');
            out.push_str(&self.protocol);
        }
        out
    }
}

impl ServiceInspection {
    /// IDs of attached networks, in inspection order.
    pub fn network_ids(&self) -> Vec<&str> {
        self.spec
            .task_template
            .networks
            .iter()
            .map(|network| network.target.as_str())
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Build the comparable state, given network names resolved from
    /// [`Self::network_ids`].
    pub fn to_state(&self, networks: Vec<String>) -> ServiceState {
        let container = &self.spec.task_template.container_spec;
        let update = self.spec.update_config.clone().unwrap_or_default();

        ServiceState {
            command: container.args.clone(),
            env: container.env.clone(),
            image: normalize_image(&container.image),
            init: container.init,
            // Mounts are not read back yet.
            mounts: Vec::new(),
            networks,
            publish: self.spec.endpoint_spec.ports.iter().map(PortConfig::render).collect(),
            replicas: self
                .spec
                .mode
                .replicated
                .as_ref()
                .map(|mode| mode.replicas.to_string())
                .unwrap_or_default(),
            secrets: container
                .secrets
                .iter()
                .map(|secret| secret.secret_name.clone())
                .collect(),
            update_delay: delay_from_nanos(update.delay),
            update_failure_action: normalize_default(
                &update.failure_action,
                DEFAULT_UPDATE_FAILURE_ACTION,
            ),
            update_order: normalize_default(&update.order, DEFAULT_UPDATE_ORDER),
            update_parallelism: update
                .parallelism
                .map(|n| normalize_default(&n.to_string(), DEFAULT_UPDATE_PARALLELISM))
                .unwrap_or_default(),
            user: container.user.clone(),
            workdir: container.dir.clone(),
        }
    }
}

/// One line of `docker service ls --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServiceListing {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub image: String,
    pub mode: String,
    pub replicas: String,
    pub ports: String,
}

/// One line of `docker network ls --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NetworkListing {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct DockerInfo {
    swarm: SwarmInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SwarmInfo {
    #[serde(rename = "NodeID")]
    node_id: String,
}

// ============================================================================
// Commands
// ============================================================================

/// List managed services whose name starts with `name` (all when empty).
pub fn list_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker service ls")
        .flag("format", "json")
        .flag("filter", format!("label={SERVICE_LABEL}"))
        .flag_if(!name.is_empty(), "filter", format!("name={name}"))
}

pub fn inspect_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker service inspect")
        .flag("format", "json")
        .arg(name)
}

/// Look up networks by ID, one filter per ID.
pub fn network_lookup_command(ids: &[&str]) -> ShellCommand {
    ShellCommand::new("docker network ls")
        .flag("format", "json")
        .switch("no-trunc")
        .flag_each("filter", ids.iter().map(|id| format!("id={id}")))
}

/// List managed networks, optionally narrowed to names starting with `name`.
pub fn network_list_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker network ls")
        .flag("format", "json")
        .flag("filter", format!("label={LABEL}"))
        .flag_if(!name.is_empty(), "filter", format!("name={name}"))
}

pub fn info_command() -> ShellCommand {
    ShellCommand::new("docker info").flag("format", "json")
}

// ============================================================================
// Parsing
// ============================================================================

/// Decode newline-delimited JSON, skipping blank lines.
pub fn parse_json_lines<T: DeserializeOwned>(what: &'static str, output: &str) -> Result<Vec<T>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(|err| Error::parse(what, line, err)))
        .collect()
}

/// Decode an inspection array and return its first element.
pub fn parse_inspection(output: &str) -> Result<ServiceInspection> {
    let mut items: Vec<ServiceInspection> = serde_json::from_str(output.trim())
        .map_err(|err| Error::parse("service inspection", output, err))?;
    if items.is_empty() {
        return Err(Error::EmptyResult {
            what: "service inspection",
        });
    }
    Ok(items.swap_remove(0))
}

/// Find the listing whose name is exactly `name`.
///
/// The name filter matches prefixes, so `web` would also list `web-admin`.
pub fn find_listing(output: &str, name: &str) -> Result<Option<ServiceListing>> {
    Ok(parse_json_lines::<ServiceListing>("service listing", output)?
        .into_iter()
        .find(|listing| listing.name == name))
}

/// Whether `docker info` reports this node as part of a swarm.
pub fn swarm_active(output: &str) -> Result<bool> {
    let info: DockerInfo =
        serde_json::from_str(output.trim()).map_err(|err| Error::parse("docker info", output, err))?;
    Ok(!info.swarm.node_id.is_empty())
}

// ============================================================================
// Reads
// ============================================================================

/// Find a managed service by exact name.
pub fn find_service(transport: &mut dyn Transport, name: &str) -> Result<Option<ServiceListing>> {
    let mut found = None;
    Pipeline::new(transport)
        .run(list_command(name), |output| {
            found = find_listing(output, name)?;
            Ok(Flow::Continue)
        })
        .finish()?;
    Ok(found)
}

/// Read the current state of `name`, resolving network IDs to names.
pub fn read_state(transport: &mut dyn Transport, name: &str) -> Result<ServiceState> {
    let mut inspection = ServiceInspection::default();
    let mut networks = Vec::new();

    let pipeline = Pipeline::new(transport).run(inspect_command(name), |output| {
        inspection = parse_inspection(output)?;
        Ok(if inspection.network_ids().is_empty() {
            Flow::Stop
        } else {
            Flow::Continue
        })
    });
    pipeline
        .run(network_lookup_command(&inspection.network_ids()), |output| {
            networks = parse_json_lines::<NetworkListing>("network listing", output)?
                .into_iter()
                .map(|network| network.name)
                .collect();
            Ok(Flow::Continue)
        })
        .on_error(skip_reset)
        .finish()?;

    Ok(inspection.to_state(networks))
}

/// Raw inspection document for `name`, for `--json` output.
pub fn read_raw(transport: &mut dyn Transport, name: &str) -> Result<serde_json::Value> {
    let mut raw = serde_json::Value::Null;
    Pipeline::new(transport)
        .run(inspect_command(name), |output| {
            let items: Vec<serde_json::Value> = serde_json::from_str(output.trim())
                .map_err(|err| Error::parse("service inspection", output, err))?;
            raw = items.into_iter().next().ok_or(Error::EmptyResult {
                what: "service inspection",
            })?;
            Ok(Flow::Continue)
        })
        .finish()?;
    Ok(raw)
}

/// A managed service as shown by `service list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub mode: String,
    pub replicas: String,
    pub ports: Vec<String>,
}

/// List every managed service, with published ports from inspection.
pub fn list_services(transport: &mut dyn Transport) -> Result<Vec<ServiceSummary>> {
    let mut listings = Vec::new();
    Pipeline::new(&mut *transport)
        .run(list_command(""), |output| {
            listings = parse_json_lines::<ServiceListing>("service listing", output)?;
            Ok(Flow::Continue)
        })
        .finish()?;

    let mut summaries = Vec::with_capacity(listings.len());
    for listing in listings {
        let mut ports = Vec::new();
        Pipeline::new(&mut *transport)
            .run(inspect_command(&listing.name), |output| {
                ports = parse_inspection(output)?
                    .endpoint
                    .ports
                    .iter()
                    .map(PortConfig::render)
                    .collect();
                Ok(Flow::Continue)
            })
            .finish()?;
        summaries.push(ServiceSummary {
            id: listing.id,
            name: listing.name,
            image: normalize_image(&listing.image),
            mode: listing.mode,
            replicas: listing.replicas,
            ports,
        });
    }
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::MockTransport;

    pub(crate) const INSPECT_PLAIN: &str = r#"[{
        "ID": "abc123",
        "Spec": {
            "Name": "fake-service",
            "Labels": {"skiff": "service"},
            "TaskTemplate": {
                "ContainerSpec": {
                    "Image": "python:3.12@sha256:0123",
                    "Args": ["python3", "-m", "http.server", "80"],
                    "Init": false
                }
            },
            "Mode": {"Replicated": {"Replicas": 1}},
            "UpdateConfig": {
                "Parallelism": 1,
                "FailureAction": "pause",
                "Order": "stop-first"
            }
        }
    }]"#;

    pub(crate) const INSPECT_FULL: &str = r#"[{
        "ID": "def456",
        "Spec": {
            "Name": "web",
            "TaskTemplate": {
                "ContainerSpec": {
                    "Image": "nginx:1.27",
                    "Env": ["A=1", "B=2"],
                    "Init": true,
                    "Secrets": [{"SecretName": "db-password", "SecretID": "s1"}],
                    "User": "app",
                    "Dir": "/srv"
                },
                "Networks": [{"Target": "net1"}, {"Target": "net2"}]
            },
            "Mode": {"Replicated": {"Replicas": 3}},
            "UpdateConfig": {
                "Parallelism": 2,
                "Delay": 90000000000,
                "FailureAction": "rollback",
                "Order": "start-first"
            },
            "EndpointSpec": {
                "Ports": [
                    {"Protocol": "tcp", "TargetPort": 80, "PublishedPort": 8080},
                    {"Protocol": "udp", "TargetPort": 53, "PublishedPort": 5353}
                ]
            }
        },
        "Endpoint": {
            "Ports": [{"Protocol": "tcp", "TargetPort": 80, "PublishedPort": 8080}]
        }
    }]"#;

    pub(crate) const NETWORKS: &str = "{\"ID\":\"net1\",\"Name\":\"default\",\"Driver\":\"overlay\",\"Scope\":\"swarm\"}\n{\"ID\":\"net2\",\"Name\":\"backend\",\"Driver\":\"overlay\",\"Scope\":\"swarm\"}\n";

    pub(crate) fn listing(name: &str, image: &str) -> String {
        format!(
            "{{\"ID\":\"id-{name}\",\"Image\":\"{image}\",\"Mode\":\"replicated\",\"Name\":\"{name}\",\"Ports\":\"\",\"Replicas\":\"1/1\"}}\n"
        )
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            list_command("web").to_string(),
            "docker service ls --format json --filter label=skiff=service --filter name=web"
        );
        assert_eq!(
            list_command("").to_string(),
            "docker service ls --format json --filter label=skiff=service"
        );
        assert_eq!(
            inspect_command("web").to_string(),
            "docker service inspect --format json web"
        );
        assert_eq!(
            network_lookup_command(&["a1", "b2"]).to_string(),
            "docker network ls --format json --no-trunc --filter id=a1 --filter id=b2"
        );
    }

    #[test]
    fn test_plain_inspection_normalizes_defaults() {
        let state = parse_inspection(INSPECT_PLAIN).unwrap().to_state(Vec::new());
        assert_eq!(state.image, "python:3.12");
        assert_eq!(state.command, vec!["python3", "-m", "http.server", "80"]);
        assert_eq!(state.replicas, "1");
        assert_eq!(state.update_delay, "");
        assert_eq!(state.update_failure_action, "");
        assert_eq!(state.update_order, "");
        assert_eq!(state.update_parallelism, "");
        assert!(!state.init);
        assert!(state.env.is_empty());
    }

    #[test]
    fn test_full_inspection() {
        let inspection = parse_inspection(INSPECT_FULL).unwrap();
        assert_eq!(inspection.network_ids(), vec!["net1", "net2"]);
        let state = inspection.to_state(vec!["default".into(), "backend".into()]);
        assert_eq!(state.env, vec!["A=1", "B=2"]);
        assert!(state.init);
        assert_eq!(state.secrets, vec!["db-password"]);
        assert_eq!(state.publish, vec!["80:8080", "53:5353/udp"]);
        assert_eq!(state.replicas, "3");
        assert_eq!(state.update_delay, "1m30s");
        assert_eq!(state.update_failure_action, "rollback");
        assert_eq!(state.update_order, "start-first");
        assert_eq!(state.update_parallelism, "2");
        assert_eq!(state.user, "app");
        assert_eq!(state.workdir, "/srv");
    }

    #[test]
    fn test_null_fields_are_tolerated() {
        let raw = r#"[{"Spec": {"TaskTemplate": {"ContainerSpec": {"Image": "x", "Args": null, "Env": null}, "Networks": null}}}]"#;
        let state = parse_inspection(raw).unwrap().to_state(Vec::new());
        assert_eq!(state.image, "x");
        assert!(state.command.is_empty());
        assert_eq!(state.replicas, "");
    }

    #[test]
    fn test_empty_inspection_is_error() {
        assert!(matches!(
            parse_inspection("[]"),
            Err(Error::EmptyResult { .. })
        ));
        assert!(matches!(
            parse_inspection("not json"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_find_listing_requires_exact_name() {
        let output = format!("{}{}", listing("web-admin", "a"), listing("web", "b"));
        let found = find_listing(&output, "web").unwrap().unwrap();
        assert_eq!(found.image, "b");
        assert!(find_listing(&listing("web-admin", "a"), "web").unwrap().is_none());
        assert!(find_listing("", "web").unwrap().is_none());
    }

    #[test]
    fn test_swarm_active() {
        assert!(swarm_active(r#"{"Swarm":{"NodeID":"n1"}}"#).unwrap());
        assert!(!swarm_active(r#"{"Swarm":{"NodeID":""}}"#).unwrap());
        assert!(swarm_active("garbage").is_err());
    }

    #[test]
    fn test_read_state_without_networks_skips_lookup() {
        let mut mock = MockTransport::new().respond(INSPECT_PLAIN);
        let state = read_state(&mut mock, "fake-service").unwrap();
        assert_eq!(state.image, "python:3.12");
        assert_eq!(mock.commands().len(), 1);
        assert!(!mock.ran("docker network ls"));
    }

    #[test]
    fn test_read_state_resolves_networks() {
        let mut mock = MockTransport::new()
            .respond_to("docker service inspect", INSPECT_FULL)
            .respond_to("docker network ls", NETWORKS);
        let state = read_state(&mut mock, "web").unwrap();
        assert_eq!(state.networks, vec!["default", "backend"]);
        assert_eq!(
            mock.commands()[1],
            "docker network ls --format json --no-trunc --filter id=net1 --filter id=net2"
        );
    }

    #[test]
    fn test_read_state_surfaces_failures() {
        let mut mock = MockTransport::new().fail_on("docker service inspect");
        assert!(matches!(
            read_state(&mut mock, "web"),
            Err(Error::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_read_state_reports_undecodable_payload() {
        let mut mock = MockTransport::new().respond("<html>502 Bad Gateway</html>");
        let message = read_state(&mut mock, "web").unwrap_err().to_string();
        assert!(message.starts_with("could not parse service inspection"));
        assert!(message.contains("<html>502 Bad Gateway</html>"));
    }

    #[test]
    fn test_list_services() {
        let output = format!(
            "{}{}",
            listing("web", "nginx:1.27@sha256:ff"),
            listing("api", "python:3.12")
        );
        let mut mock = MockTransport::new()
            .respond_to("docker service ls", output)
            .respond_to("docker service inspect --format json web", INSPECT_FULL)
            .respond_to("docker service inspect --format json api", INSPECT_PLAIN);
        let services = list_services(&mut mock).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "api");
        assert!(services[0].ports.is_empty());
        assert_eq!(services[1].image, "nginx:1.27");
        assert_eq!(services[1].ports, vec!["80:8080"]);
    }

    #[test]
    fn test_read_raw() {
        let mut mock = MockTransport::new().respond(INSPECT_PLAIN);
        let raw = read_raw(&mut mock, "fake-service").unwrap();
        assert_eq!(raw["ID"], "abc123");
    }
}
