//! Container request building.
//!
//! A [`ContainerRequest`] accumulates options in the order they are applied;
//! later options override earlier ones on the same field, so a duplicated
//! environment key keeps its last value. [`ContainerRequest::build`] validates
//! the accumulated request and produces an immutable [`ContainerSpec`]. Building
//! never talks to the container engine.

mod port;

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8PathBuf;

use crate::error::SpecError;
use crate::wait::WaitStrategy;

pub use port::{PortSpec, Protocol};

/// One file staged from the host into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    host_path: Utf8PathBuf,
    container_path: String,
}

impl FileCopy {
    /// Stage `host_path` at the absolute `container_path`.
    #[must_use]
    pub fn new(host_path: impl Into<Utf8PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Return the host path.
    #[must_use]
    pub fn host_path(&self) -> &Utf8PathBuf {
        &self.host_path
    }

    /// Return the destination path inside the container.
    #[must_use]
    pub fn container_path(&self) -> &str {
        &self.container_path
    }
}

/// A single configuration option applied to a [`ContainerRequest`].
#[derive(Debug, Clone)]
pub enum ContainerOption {
    /// Replace the base image.
    Image(String),
    /// Register a port to map, such as `80` or `53/udp`.
    ExposedPort(String),
    /// Set one environment entry.
    EnvVar {
        /// Variable name.
        key: String,
        /// Variable value.
        value: String,
    },
    /// Stage one file into the container.
    CopyFile(FileCopy),
    /// Install the readiness check.
    WaitStrategy(WaitStrategy),
    /// Attach the container to a named network.
    Network(String),
    /// Set the container name.
    Name(String),
    /// Replace the command argv.
    Cmd(Vec<String>),
}

/// Accumulates container options before validation.
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    image: String,
    name: Option<String>,
    cmd: Option<Vec<String>>,
    exposed_ports: Vec<String>,
    env: BTreeMap<String, String>,
    files: Vec<FileCopy>,
    wait_strategy: Option<WaitStrategy>,
    networks: Vec<String>,
}

impl ContainerRequest {
    /// Start a request for `image`.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            cmd: None,
            exposed_ports: vec![],
            env: BTreeMap::new(),
            files: vec![],
            wait_strategy: None,
            networks: vec![],
        }
    }

    /// Build a request from an image and a sequence of options applied in order.
    #[must_use]
    pub fn from_options(
        image: impl Into<String>,
        options: impl IntoIterator<Item = ContainerOption>,
    ) -> Self {
        options
            .into_iter()
            .fold(Self::new(image), |request, option| request.apply(option))
    }

    /// Apply one option.
    #[must_use]
    pub fn apply(mut self, option: ContainerOption) -> Self {
        match option {
            ContainerOption::Image(image) => self.image = image,
            ContainerOption::ExposedPort(port) => self.exposed_ports.push(port),
            ContainerOption::EnvVar { key, value } => {
                self.env.insert(key, value);
            }
            ContainerOption::CopyFile(file) => self.files.push(file),
            ContainerOption::WaitStrategy(strategy) => self.wait_strategy = Some(strategy),
            ContainerOption::Network(network) => self.networks.push(network),
            ContainerOption::Name(name) => self.name = Some(name),
            ContainerOption::Cmd(cmd) => self.cmd = Some(cmd),
        }
        self
    }

    /// Register a port to map.
    #[must_use]
    pub fn with_exposed_port(self, port: impl Into<String>) -> Self {
        self.apply(ContainerOption::ExposedPort(port.into()))
    }

    /// Set one environment entry.
    #[must_use]
    pub fn with_env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.apply(ContainerOption::EnvVar {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Stage a host file at `container_path`.
    #[must_use]
    pub fn with_file(
        self,
        host_path: impl Into<Utf8PathBuf>,
        container_path: impl Into<String>,
    ) -> Self {
        self.apply(ContainerOption::CopyFile(FileCopy::new(
            host_path,
            container_path,
        )))
    }

    /// Install the readiness check.
    #[must_use]
    pub fn with_wait_strategy(self, strategy: WaitStrategy) -> Self {
        self.apply(ContainerOption::WaitStrategy(strategy))
    }

    /// Attach the container to a named network.
    #[must_use]
    pub fn with_network(self, network: impl Into<String>) -> Self {
        self.apply(ContainerOption::Network(network.into()))
    }

    /// Set the container name.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.apply(ContainerOption::Name(name.into()))
    }

    /// Replace the command argv.
    #[must_use]
    pub fn with_cmd<I, S>(self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(ContainerOption::Cmd(cmd.into_iter().map(Into::into).collect()))
    }

    /// Validate the request and produce an immutable spec.
    ///
    /// # Errors
    ///
    /// Returns `SpecError` when the image is empty, a port is malformed or out
    /// of range, an environment key is invalid, a staged host file does not
    /// exist, a container path is relative, or a port-based wait strategy
    /// names a port that is not exposed.
    pub fn build(self) -> Result<ContainerSpec, SpecError> {
        let image = validate_image(&self.image)?;
        let exposed_ports = self
            .exposed_ports
            .iter()
            .map(String::as_str)
            .map(PortSpec::parse)
            .collect::<Result<BTreeSet<_>, _>>()?;

        if let Some(key) = self
            .env
            .keys()
            .find(|key| key.is_empty() || key.contains('='))
        {
            return Err(SpecError::InvalidEnvKey { key: key.clone() });
        }

        for file in &self.files {
            validate_file_copy(file)?;
        }

        if let Some(port) = self
            .wait_strategy
            .as_ref()
            .and_then(WaitStrategy::port)
            .filter(|port| !exposed_ports.contains(port))
        {
            return Err(SpecError::WaitPortNotExposed {
                port: port.to_string(),
            });
        }

        let mut networks: Vec<String> = vec![];
        for network in self.networks {
            if !network.trim().is_empty() && !networks.contains(&network) {
                networks.push(network);
            }
        }

        Ok(ContainerSpec {
            image,
            name: self.name.filter(|value| !value.trim().is_empty()),
            cmd: self.cmd,
            exposed_ports,
            env: self.env,
            files: self.files,
            wait_strategy: self.wait_strategy,
            networks,
        })
    }
}

fn validate_image(image: &str) -> Result<String, SpecError> {
    let trimmed = image.trim();

    if trimmed.is_empty() {
        return Err(SpecError::EmptyImage);
    }

    Ok(String::from(trimmed))
}

fn validate_file_copy(file: &FileCopy) -> Result<(), SpecError> {
    if !file.container_path.starts_with('/') {
        return Err(SpecError::RelativeContainerPath {
            path: file.container_path.clone(),
        });
    }

    if !file.host_path.is_file() {
        return Err(SpecError::MissingHostFile {
            path: file.host_path.as_std_path().to_path_buf(),
        });
    }

    Ok(())
}

/// A validated, immutable container configuration.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    image: String,
    name: Option<String>,
    cmd: Option<Vec<String>>,
    exposed_ports: BTreeSet<PortSpec>,
    env: BTreeMap<String, String>,
    files: Vec<FileCopy>,
    wait_strategy: Option<WaitStrategy>,
    networks: Vec<String>,
}

impl ContainerSpec {
    /// Return the image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the optional container name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the optional command argv.
    #[must_use]
    pub fn cmd(&self) -> Option<&[String]> {
        self.cmd.as_deref()
    }

    /// Return the exposed ports in ascending order.
    #[must_use]
    pub const fn exposed_ports(&self) -> &BTreeSet<PortSpec> {
        &self.exposed_ports
    }

    /// Return the environment map.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Return the environment in `KEY=value` form.
    #[must_use]
    pub fn env_entries(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    /// Return the staged files in application order.
    #[must_use]
    pub fn files(&self) -> &[FileCopy] {
        &self.files
    }

    /// Return the readiness check, if one was installed.
    #[must_use]
    pub const fn wait_strategy(&self) -> Option<&WaitStrategy> {
        self.wait_strategy.as_ref()
    }

    /// Return the networks the container joins.
    #[must_use]
    pub fn networks(&self) -> &[String] {
        &self.networks
    }
}
