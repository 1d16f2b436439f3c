use crate::config::types::{
    Config, DispatcherConfig, OutputConfig, ServiceConfig, ServiceKind, SourceFormat,
    UserAgentConfig,
};
use crate::url::expand_template;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_dispatcher_config(&config.dispatcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_services(&config.services)?;
    Ok(())
}

fn validate_dispatcher_config(config: &DispatcherConfig) -> Result<(), ConfigError> {
    if config.deadline_ms == Some(0) {
        return Err(ConfigError::Validation(
            "deadline-ms must be greater than zero when set".to_string(),
        ));
    }

    validate_rate("default-rate", config.default_rate)?;

    if config.default_burst < 1 {
        return Err(ConfigError::Validation(format!(
            "default-burst must be >= 1, got {}",
            config.default_burst
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.identity.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent identity cannot be empty".to_string(),
        ));
    }

    // Header values cannot carry line breaks
    if config.identity.contains(['\r', '\n']) || config.accept_language.contains(['\r', '\n']) {
        return Err(ConfigError::Validation(
            "user-agent values cannot contain line breaks".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.warc_dir.is_empty() {
        return Err(ConfigError::Validation(
            "warc-dir cannot be empty".to_string(),
        ));
    }

    if matches!(&config.report_path, Some(p) if p.is_empty()) {
        return Err(ConfigError::Validation(
            "report-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_services(services: &[ServiceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for service in services {
        if !seen.insert(service.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate service name '{}'",
                service.name
            )));
        }
        validate_service(service)?;
    }

    Ok(())
}

/// Validates one service entry
fn validate_service(service: &ServiceConfig) -> Result<(), ConfigError> {
    if service.name.is_empty()
        || !service
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Service name must be non-empty and contain only alphanumerics, '-' or '_', got '{}'",
            service.name
        )));
    }

    validate_rate(&format!("{}.rate", service.name), service.rate)?;

    if service.burst < 1 {
        return Err(ConfigError::Validation(format!(
            "{}.burst must be >= 1, got {}",
            service.name, service.burst
        )));
    }

    if service.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "{}.timeout-ms must be >= 100ms, got {}ms",
            service.name, service.timeout_ms
        )));
    }

    if service.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "{}.max-attempts must be >= 1",
            service.name
        )));
    }

    match service.kind {
        ServiceKind::Primary | ServiceKind::Mirror => {
            if service.endpoints.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Service '{}' must have at least one endpoint",
                    service.name
                )));
            }
        }
        ServiceKind::Aggregate => {
            if service.sources.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Aggregate service '{}' must have at least one source",
                    service.name
                )));
            }
        }
    }

    for endpoint in &service.endpoints {
        validate_template(&service.name, endpoint)?;
    }
    if let Some(check) = &service.check_endpoint {
        validate_template(&service.name, check)?;
    }
    if let Some(lookup) = &service.lookup_endpoint {
        validate_template(&service.name, lookup)?;
    }
    for source in &service.sources {
        if source.name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Service '{}' has a source without a name",
                service.name
            )));
        }
        if source.format != SourceFormat::Link && !source.template.contains("{url") {
            tracing::warn!(
                "Source '{}' of '{}' does not reference the target URL",
                source.name,
                service.name
            );
        }
        validate_template(&service.name, &source.template)?;
    }

    Ok(())
}

fn validate_rate(field: &str, rate: f64) -> Result<(), ConfigError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a positive number, got {}",
            field, rate
        )));
    }
    Ok(())
}

/// Expands a template against a sample target and checks it yields an HTTP(S) URL
fn validate_template(service: &str, template: &str) -> Result<(), ConfigError> {
    let expanded = expand_template(
        template,
        "https://example.com/page",
        "https://mirror.example.com",
    );

    let url = Url::parse(&expanded).map_err(|e| {
        ConfigError::InvalidEndpoint(format!(
            "Service '{}' endpoint '{}' is not a valid URL: {}",
            service, template, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidEndpoint(format!(
            "Service '{}' endpoint '{}' must use http or https",
            service, template
        )));
    }

    Ok(())
}
