//! # Database Instance and Credential
//!
//! A single managed MySQL instance in the isolated tier. When no credential is
//! supplied, a secret with a generated password is created alongside the
//! instance and exposed as a reference; callers must treat a missing reference
//! as fatal.

use super::{Resource, ResourceId, ResourceKind, SecurityGroup, TopologyError};
use crate::constants::{
    GENERATED_PASSWORD_EXCLUDED_CHARS, GENERATED_PASSWORD_LENGTH,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEngine {
    Mysql { version: String },
}

impl DatabaseEngine {
    pub fn mysql(version: impl Into<String>) -> Self {
        DatabaseEngine::Mysql {
            version: version.into(),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        match self {
            DatabaseEngine::Mysql { .. } => "mysql",
        }
    }

    pub fn version(&self) -> &str {
        match self {
            DatabaseEngine::Mysql { version } => version,
        }
    }

    /// Proxy engine family (`MYSQL`)
    pub fn proxy_family(&self) -> &'static str {
        match self {
            DatabaseEngine::Mysql { .. } => "MYSQL",
        }
    }
}

/// Instance class and size, rendered as `db.<class>.<size>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceType {
    pub class: String,
    pub size: String,
}

impl InstanceType {
    pub fn of(class: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            size: size.into(),
        }
    }

    pub fn db_instance_class(&self) -> String {
        format!("db.{}.{}", self.class, self.size)
    }
}

/// How the instance's master credential is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Generate a password into a new secret for `username`
    Generated { username: String },
    /// Use an existing secret in the stack whose credential is for `username`
    FromSecret { secret: ResourceId, username: String },
    /// Password managed outside the stack; no secret reference exists
    Unmanaged { username: String },
}

/// Generated credential secret. Holds only the generation template, never a value.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSecret {
    pub name: String,
    pub description: String,
    pub username: String,
    pub password_length: u32,
    pub exclude_characters: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbSubnetGroup {
    pub description: String,
    pub subnets: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInstance {
    pub engine: DatabaseEngine,
    pub instance_type: InstanceType,
    pub port: u16,
    pub allocated_storage_gib: u32,
    pub subnet_group: ResourceId,
    pub security_groups: Vec<ResourceId>,
    pub master_username: String,
    /// Secret holding the master credential
    pub secret: Option<ResourceId>,
    pub multi_az: bool,
    pub storage_encrypted: bool,
}

impl DatabaseInstance {
    pub fn builder(id: ResourceId) -> DatabaseInstanceBuilder {
        DatabaseInstanceBuilder::new(id)
    }

    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = vec![self.subnet_group.clone()];
        deps.extend(self.security_groups.iter().cloned());
        deps.extend(self.secret.iter().cloned());
        deps
    }
}

/// Everything the instance brings with it
#[derive(Debug, Clone)]
pub struct DatabaseResources {
    pub instance: Resource,
    pub subnet_group: Resource,
    pub security_group: Resource,
    /// Present only when the credential was generated here
    pub generated_secret: Option<Resource>,
}

impl DatabaseResources {
    /// Reference to the credential secret, if the instance has one
    pub fn secret(&self) -> Option<&ResourceId> {
        match &self.instance.kind {
            ResourceKind::DatabaseInstance(db) => db.secret.as_ref(),
            _ => None,
        }
    }

    pub fn port(&self) -> u16 {
        match &self.instance.kind {
            ResourceKind::DatabaseInstance(db) => db.port,
            _ => 0,
        }
    }

    pub fn into_resources(self) -> Vec<Resource> {
        let mut resources = Vec::with_capacity(4);
        resources.extend(self.generated_secret);
        resources.push(self.subnet_group);
        resources.push(self.security_group);
        resources.push(self.instance);
        resources
    }
}

#[derive(Debug)]
pub struct DatabaseInstanceBuilder {
    id: ResourceId,
    engine: Option<DatabaseEngine>,
    instance_type: Option<InstanceType>,
    port: u16,
    allocated_storage_gib: u32,
    vpc: Option<ResourceId>,
    subnets: Vec<ResourceId>,
    subnet_group_description: String,
    credentials: Credentials,
    secret_name: Option<String>,
    removal_policy: super::RemovalPolicy,
}

impl DatabaseInstanceBuilder {
    fn new(id: ResourceId) -> Self {
        Self {
            id,
            engine: None,
            instance_type: None,
            port: crate::constants::DEFAULT_DATABASE_PORT,
            allocated_storage_gib: crate::constants::DEFAULT_ALLOCATED_STORAGE_GIB,
            vpc: None,
            subnets: Vec::new(),
            subnet_group_description: String::new(),
            credentials: Credentials::Generated {
                username: crate::constants::DEFAULT_DATABASE_USERNAME.to_string(),
            },
            secret_name: None,
            removal_policy: super::RemovalPolicy::Snapshot,
        }
    }

    #[must_use]
    pub fn engine(mut self, engine: DatabaseEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn instance_type(mut self, instance_type: InstanceType) -> Self {
        self.instance_type = Some(instance_type);
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn allocated_storage(mut self, gib: u32) -> Self {
        self.allocated_storage_gib = gib;
        self
    }

    /// Place the instance in `subnets` of `vpc` through a new subnet group
    #[must_use]
    pub fn subnets(
        mut self,
        vpc: ResourceId,
        subnets: Vec<ResourceId>,
        description: impl Into<String>,
    ) -> Self {
        self.vpc = Some(vpc);
        self.subnets = subnets;
        self.subnet_group_description = description.into();
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Physical name for a generated secret
    #[must_use]
    pub fn secret_name(mut self, name: impl Into<String>) -> Self {
        self.secret_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn removal_policy(mut self, policy: super::RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn build(self) -> Result<DatabaseResources, TopologyError> {
        let vpc = self.vpc.ok_or(TopologyError::NoSubnets(
            super::SubnetType::Isolated,
        ))?;
        if self.subnets.is_empty() {
            return Err(TopologyError::NoSubnets(super::SubnetType::Isolated));
        }

        let subnet_group_id = self.id.child("SubnetGroup")?;
        let security_group_id = self.id.child("SecurityGroup")?;

        let (secret, generated_secret, master_username) = match self.credentials {
            Credentials::Generated { username } => {
                let secret_id = self.id.child("Secret")?;
                let name = self
                    .secret_name
                    .unwrap_or_else(|| format!("{}/credentials", self.id));
                let secret = Resource::new(
                    secret_id.clone(),
                    ResourceKind::Secret(DatabaseSecret {
                        name,
                        description: format!("Generated master credential for {}", self.id),
                        username: username.clone(),
                        password_length: GENERATED_PASSWORD_LENGTH,
                        exclude_characters: GENERATED_PASSWORD_EXCLUDED_CHARS.to_string(),
                    }),
                );
                (Some(secret_id), Some(secret), username)
            }
            Credentials::FromSecret { secret, username } => (Some(secret), None, username),
            Credentials::Unmanaged { username } => (None, None, username),
        };

        let subnet_group = Resource::new(
            subnet_group_id.clone(),
            ResourceKind::DbSubnetGroup(DbSubnetGroup {
                description: self.subnet_group_description,
                subnets: self.subnets,
            }),
        );

        let security_group = Resource::new(
            security_group_id.clone(),
            ResourceKind::SecurityGroup(SecurityGroup::new(
                vpc,
                format!("Security group for {}", self.id),
            )),
        );

        let instance = Resource::new(
            self.id,
            ResourceKind::DatabaseInstance(DatabaseInstance {
                engine: self
                    .engine
                    .unwrap_or_else(|| DatabaseEngine::mysql(crate::constants::DEFAULT_MYSQL_VERSION)),
                instance_type: self
                    .instance_type
                    .unwrap_or_else(|| InstanceType::of("t3", "small")),
                port: self.port,
                allocated_storage_gib: self.allocated_storage_gib,
                subnet_group: subnet_group_id,
                security_groups: vec![security_group_id],
                master_username,
                secret,
                multi_az: false,
                storage_encrypted: false,
            }),
        )
        .with_removal_policy(self.removal_policy);

        Ok(DatabaseResources {
            instance,
            subnet_group,
            security_group,
            generated_secret,
        })
    }
}
