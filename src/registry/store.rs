//! SPARQL-backed monitor store.

use async_trait::async_trait;

use super::sparql::{Binding, SparqlClient};
use super::MonitorStore;
use crate::error::RegistryError;
use crate::model::{
    Container, ContainerStatus, Monitor, MonitorStatus, COMPOSE_PROJECT_LABEL, MONITOR_LABEL,
};

const PREFIXES: &str = "\
PREFIX docker: <https://w3.org/ns/bde/docker#>
PREFIX logger: <http://mu.semte.ch/vocabularies/ext/docker-logger/>
PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
";

/// Monitor store speaking to a SPARQL endpoint, partitioned by the
/// application graph.
pub struct SparqlMonitorStore {
    client: SparqlClient,
    graph: String,
    /// Operator-trusted query fragment spliced verbatim into eligibility
    /// queries. Never derived from user input.
    container_filter: String,
}

impl SparqlMonitorStore {
    pub fn new(client: SparqlClient, graph: impl Into<String>, filter: impl Into<String>) -> Self {
        SparqlMonitorStore {
            client,
            graph: graph.into(),
            container_filter: filter.into(),
        }
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Triple pattern excluding containers that are themselves monitors.
fn not_monitor_clause() -> String {
    format!("FILTER(NOT EXISTS {{ ?uri docker:label/docker:key \"{MONITOR_LABEL}\" }})")
}

/// OPTIONAL clause binding ?project to the compose project label.
fn project_clause(subject: &str) -> String {
    format!(
        "OPTIONAL {{ {subject} docker:label ?projectLabel . \
         ?projectLabel docker:key \"{COMPOSE_PROJECT_LABEL}\" ; docker:value ?project . }}"
    )
}

fn logged_containers_query(graph: &str, filter: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?uri ?id ?name ?image ?project WHERE {{ GRAPH <{graph}> {{\n\
         ?uri a docker:Container ;\n\
              docker:id ?id ;\n\
              docker:name ?name ;\n\
              docker:image ?image ;\n\
              docker:state/docker:status \"running\" .\n\
         {filter}\n\
         {not_monitor}\n\
         {project}\n\
         }} }}",
        not_monitor = not_monitor_clause(),
        project = project_clause("?uri"),
    )
}

fn find_all_query(graph: &str, status: Option<MonitorStatus>) -> String {
    let status_filter = match status {
        Some(s) => format!("FILTER(?status = \"{}\")", s.as_str()),
        None => String::new(),
    };
    format!(
        "{PREFIXES}\
         SELECT ?uri ?id ?status ?dockerContainer WHERE {{ GRAPH <{graph}> {{\n\
         ?uri a logger:NetworkMonitor ;\n\
              mu:uuid ?id ;\n\
              logger:status ?status ;\n\
              logger:monitors ?dockerContainer .\n\
         {status_filter}\n\
         }} }}"
    )
}

fn find_by_logged_container_query(graph: &str, container_uri: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?uri ?id WHERE {{ GRAPH <{graph}> {{\n\
         ?uri a logger:NetworkMonitor ;\n\
              mu:uuid ?id ;\n\
              logger:status \"running\" ;\n\
              logger:monitors <{container_uri}> .\n\
         }} }}"
    )
}

fn find_by_monitor_host_query(graph: &str, container_id: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?uri ?status ?dockerContainer WHERE {{ GRAPH <{graph}> {{\n\
         ?uri a logger:NetworkMonitor ;\n\
              mu:uuid \"{id}\" ;\n\
              logger:status ?status ;\n\
              logger:monitors ?dockerContainer .\n\
         }} }}",
        id = escape_literal(container_id),
    )
}

fn logged_container_query(graph: &str, container_uri: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?id ?name ?image ?status ?project WHERE {{ GRAPH <{graph}> {{\n\
         <{container_uri}> a docker:Container ;\n\
              docker:id ?id ;\n\
              docker:name ?name ;\n\
              docker:image ?image .\n\
         OPTIONAL {{ <{container_uri}> docker:state/docker:status ?status . }}\n\
         {project}\n\
         }} }}",
        project = project_clause(&format!("<{container_uri}>")),
    )
}

fn container_status_query(graph: &str, companion_id: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?status WHERE {{ GRAPH <{graph}> {{\n\
         ?container docker:id \"{id}\" ;\n\
                    docker:state/docker:status ?status .\n\
         }} }}",
        id = escape_literal(companion_id),
    )
}

fn find_by_state_query(graph: &str, state_uri: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?uri ?id ?name ?image ?status ?project WHERE {{ GRAPH <{graph}> {{\n\
         ?uri a docker:Container ;\n\
              docker:id ?id ;\n\
              docker:name ?name ;\n\
              docker:image ?image ;\n\
              docker:state <{state_uri}> .\n\
         OPTIONAL {{ <{state_uri}> docker:status ?status . }}\n\
         {project}\n\
         }} }}",
        project = project_clause("?uri"),
    )
}

fn is_logged_query(graph: &str, filter: &str, container_uri: &str) -> String {
    format!(
        "{PREFIXES}\
         ASK {{ GRAPH <{graph}> {{\n\
         VALUES ?uri {{ <{container_uri}> }}\n\
         ?uri a docker:Container .\n\
         {filter}\n\
         {not_monitor}\n\
         }} }}",
        not_monitor = not_monitor_clause(),
    )
}

fn label_value_query(graph: &str, container_id: &str, key: &str) -> String {
    format!(
        "{PREFIXES}\
         SELECT ?value WHERE {{ GRAPH <{graph}> {{\n\
         ?container docker:id \"{id}\" ;\n\
                    docker:label ?label .\n\
         ?label docker:key \"{key}\" ;\n\
                docker:value ?value .\n\
         }} }}",
        id = escape_literal(container_id),
        key = escape_literal(key),
    )
}

fn save_update(graph: &str, monitor: &Monitor) -> String {
    let insert = format!(
        "INSERT DATA {{ GRAPH <{graph}> {{\n\
         <{uri}> a logger:NetworkMonitor ;\n\
              mu:uuid \"{id}\" ;\n\
              logger:status \"{status}\" ;\n\
              logger:monitors <{logged}> .\n\
         }} }}",
        uri = monitor.uri,
        id = escape_literal(&monitor.id),
        status = monitor.status.as_str(),
        logged = monitor.logged_container,
    );

    if monitor.persisted {
        format!(
            "{PREFIXES}\
             DELETE WHERE {{ GRAPH <{graph}> {{ <{uri}> ?p ?o . }} }} ;\n\
             {insert}",
            uri = monitor.uri,
        )
    } else {
        format!("{PREFIXES}{insert}")
    }
}

fn remove_update(graph: &str, monitor: &Monitor) -> String {
    format!(
        "{PREFIXES}\
         DELETE WHERE {{ GRAPH <{graph}> {{ <{uri}> ?p ?o . }} }}",
        uri = monitor.uri,
    )
}

fn require<'a>(row: &'a Binding, var: &str) -> Result<&'a str, RegistryError> {
    row.get(var)
        .map(String::as_str)
        .ok_or_else(|| RegistryError::Malformed(format!("binding missing ?{var}")))
}

fn row_to_monitor(row: &Binding) -> Result<Monitor, RegistryError> {
    let status_literal = require(row, "status")?;
    let status = MonitorStatus::from_literal(status_literal).ok_or_else(|| {
        RegistryError::Malformed(format!("unknown monitor status {status_literal:?}"))
    })?;

    Ok(Monitor {
        id: require(row, "id")?.to_string(),
        uri: require(row, "uri")?.to_string(),
        status,
        logged_container: require(row, "dockerContainer")?.to_string(),
        persisted: true,
    })
}

fn row_to_container(row: &Binding, uri: String) -> Result<Container, RegistryError> {
    let status = row
        .get("status")
        .map(|s| ContainerStatus::from_literal(s))
        .unwrap_or(ContainerStatus::Unknown);

    Ok(Container {
        uri,
        id: require(row, "id")?.to_string(),
        name: require(row, "name")?.to_string(),
        image: require(row, "image")?.to_string(),
        project: row.get("project").cloned(),
        status,
    })
}

#[async_trait]
impl MonitorStore for SparqlMonitorStore {
    async fn ready(&self) -> Result<bool, RegistryError> {
        self.client.ask("ASK { ?s ?p ?o }").await
    }

    async fn find_all(
        &self,
        status: Option<MonitorStatus>,
    ) -> Result<Vec<Monitor>, RegistryError> {
        let rows = self
            .client
            .select(&find_all_query(&self.graph, status))
            .await?;
        rows.iter().map(row_to_monitor).collect()
    }

    async fn find_by_logged_container(
        &self,
        uri: &str,
    ) -> Result<Option<Monitor>, RegistryError> {
        let rows = self
            .client
            .select(&find_by_logged_container_query(&self.graph, uri))
            .await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        Ok(Some(Monitor {
            id: require(row, "id")?.to_string(),
            uri: require(row, "uri")?.to_string(),
            status: MonitorStatus::Running,
            logged_container: uri.to_string(),
            persisted: true,
        }))
    }

    async fn find_by_monitor_host(
        &self,
        container_id: &str,
    ) -> Result<Option<Monitor>, RegistryError> {
        let rows = self
            .client
            .select(&find_by_monitor_host_query(&self.graph, container_id))
            .await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let status_literal = require(row, "status")?;
        let status = MonitorStatus::from_literal(status_literal).ok_or_else(|| {
            RegistryError::Malformed(format!("unknown monitor status {status_literal:?}"))
        })?;

        Ok(Some(Monitor {
            id: container_id.to_string(),
            uri: require(row, "uri")?.to_string(),
            status,
            logged_container: require(row, "dockerContainer")?.to_string(),
            persisted: true,
        }))
    }

    async fn get_logged_container(
        &self,
        monitor: &Monitor,
    ) -> Result<Option<Container>, RegistryError> {
        let uri = &monitor.logged_container;
        let rows = self
            .client
            .select(&logged_container_query(&self.graph, uri))
            .await?;

        match rows.first() {
            Some(row) => row_to_container(row, uri.clone()).map(Some),
            None => Ok(None),
        }
    }

    async fn container_status(
        &self,
        monitor: &Monitor,
    ) -> Result<ContainerStatus, RegistryError> {
        let rows = self
            .client
            .select(&container_status_query(&self.graph, &monitor.id))
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row.get("status"))
            .map(|s| ContainerStatus::from_literal(s))
            .unwrap_or(ContainerStatus::Unknown))
    }

    async fn save(&self, monitor: &mut Monitor) -> Result<(), RegistryError> {
        self.client.update(&save_update(&self.graph, monitor)).await?;
        monitor.persisted = true;
        Ok(())
    }

    async fn remove(&self, monitor: &Monitor) -> Result<(), RegistryError> {
        self.client
            .update(&remove_update(&self.graph, monitor))
            .await
    }

    async fn logged_containers(&self) -> Result<Vec<Container>, RegistryError> {
        let rows = self
            .client
            .select(&logged_containers_query(&self.graph, &self.container_filter))
            .await?;

        rows.iter()
            .map(|row| {
                let uri = require(row, "uri")?.to_string();
                let mut container = row_to_container(row, uri)?;
                // The query already pinned the status literal.
                container.status = ContainerStatus::Running;
                Ok(container)
            })
            .collect()
    }

    async fn find_by_state(&self, state_uri: &str) -> Result<Option<Container>, RegistryError> {
        let rows = self
            .client
            .select(&find_by_state_query(&self.graph, state_uri))
            .await?;

        match rows.first() {
            Some(row) => {
                let uri = require(row, "uri")?.to_string();
                row_to_container(row, uri).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn is_logged(&self, container_uri: &str) -> Result<bool, RegistryError> {
        self.client
            .ask(&is_logged_query(
                &self.graph,
                &self.container_filter,
                container_uri,
            ))
            .await
    }

    async fn label_value(
        &self,
        container_id: &str,
        key: &str,
    ) -> Result<Option<String>, RegistryError> {
        let rows = self
            .client
            .select(&label_value_query(&self.graph, container_id, key))
            .await?;

        Ok(rows.first().and_then(|row| row.get("value")).cloned())
    }
}
