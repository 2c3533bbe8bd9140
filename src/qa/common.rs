//! Questions shared by more than one transformer or preprocessor

use super::engine::QaError;
use super::QuestionBridge;

pub const DELIM: &str = ".";
pub const SERVICES_KEY: &str = "common.services";
pub const CONTAINER_RUNTIME_KEY: &str = "common.containerruntime";
pub const REGISTRY_URL_KEY: &str = "common.registry.url";
pub const REGISTRY_NAMESPACE_KEY: &str = "common.registry.namespace";
pub const INGRESS_HOST_KEY: &str = "common.ingress.host";

pub const DEFAULT_REGISTRY_URL: &str = "quay.io";
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// Quotes a key segment so dots inside names do not split it
pub fn quote(segment: &str) -> String {
    format!("\"{}\"", segment)
}

/// `common.services."<svc>".<rest...>`
pub fn service_key(service: &str, rest: &[&str]) -> String {
    let mut key = format!("{}{}{}", SERVICES_KEY, DELIM, quote(service));
    for part in rest {
        key.push_str(DELIM);
        key.push_str(part);
    }
    key
}

pub fn container_runtime(qa: &QuestionBridge) -> Result<String, QaError> {
    qa.fetch_select(
        CONTAINER_RUNTIME_KEY,
        "Select the container runtime to use :",
        &["The container runtime selected will be used in the scripts"],
        &["docker", "podman"],
        "docker",
    )
}

pub fn registry_url(qa: &QuestionBridge) -> Result<String, QaError> {
    qa.fetch_string(
        REGISTRY_URL_KEY,
        "Enter the URL of the image registry : ",
        &["You can always change it later by changing the yamls."],
        DEFAULT_REGISTRY_URL,
    )
}

pub fn registry_namespace(qa: &QuestionBridge, project: &str) -> Result<String, QaError> {
    qa.fetch_string(
        REGISTRY_NAMESPACE_KEY,
        "Enter the namespace where the new images should be pushed : ",
        &["Ex : myproject"],
        project,
    )
}

pub fn ingress_host(qa: &QuestionBridge, project: &str) -> Result<String, QaError> {
    qa.fetch_string(
        INGRESS_HOST_KEY,
        "Provide the ingress host domain",
        &["Ingress host domain is part of service URL"],
        &format!("{}.example.com", project),
    )
}

/// Asks which port a service listens on, preferring the detected ones
pub fn port_for_service(qa: &QuestionBridge, service: &str, detected: &[u16]) -> Result<u16, QaError> {
    let key = service_key(service, &["port"]);
    let message = format!("Select port to be exposed for the service {} :", service);
    let default = detected.first().copied().unwrap_or(DEFAULT_SERVICE_PORT);

    let answer = if detected.len() > 1 {
        let options: Vec<String> = detected.iter().map(|p| p.to_string()).collect();
        let options: Vec<&str> = options.iter().map(String::as_str).collect();
        qa.fetch_select(
            &key,
            &message,
            &["Select the port the service listens on"],
            &options,
            &default.to_string(),
        )?
    } else {
        qa.fetch_string(
            &key,
            &message,
            &["Enter the port the service listens on"],
            &default.to_string(),
        )?
    };

    Ok(answer.trim().parse().unwrap_or(default))
}
