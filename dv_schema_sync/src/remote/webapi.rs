//! Dataverse Web API transport
//!
//! Authenticates with the OAuth2 client-credentials flow and talks to the
//! `/api/data/v9.2` metadata endpoints. One client serves both metadata reads
//! ([`MetadataSource`]) and schema mutations ([`EntityStore`]).

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::remote::connection::{ConnectionSettings, DEFAULT_AUTHORITY_HOST};
use crate::remote::metadata::{
    AlternateKey, AttributeMetadata, EntityMetadata, MetadataResult, MetadataSnapshot,
    RelationshipMetadata,
};
use crate::remote::source::{normalize_entity_names, MetadataSource};
use crate::remote::store::{AttributeKind, EntityStore, NewAlternateKey, NewAttribute};

const API_PATH: &str = "api/data/v9.2";
const LANGUAGE_CODE: u32 = 1033;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Largest magnitude Dataverse accepts for a decimal attribute
const DECIMAL_LIMIT: f64 = 100_000_000_000.0;
const DECIMAL_MAX_SCALE: u32 = 10;

pub const NOT_CONFIGURED: &str =
    "Dataverse connection is not configured. Set DV_ORG_URL, DV_CLIENT_ID, DV_CLIENT_SECRET, and DV_TENANT_ID.";

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// HTTP client for one Dataverse organization
pub struct WebApiClient {
    http: Client,
    settings: ConnectionSettings,
    authority_host: String,
    token: Mutex<Option<AccessToken>>,
}

impl WebApiClient {
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            settings,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Use a different token authority (sovereign clouds, tests)
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn base_url(&self) -> Result<String> {
        self.settings
            .base_url()
            .ok_or_else(|| Error::Config(NOT_CONFIGURED.to_string()))
    }

    fn credential(value: &Option<String>) -> Result<&str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config(NOT_CONFIGURED.to_string()))
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let base_url = self.base_url()?;
        let tenant = Self::credential(&self.settings.tenant_id)?;
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant);
        let scope = format!("{}/.default", base_url);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", Self::credential(&self.settings.client_id)?),
            ("client_secret", Self::credential(&self.settings.client_secret)?),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "Failed to acquire access token: {} {}",
                status,
                error_message(&body)
            )));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        *cached = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        debug!(tenant = %tenant, "Acquired Dataverse access token");

        Ok(body.access_token)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let token = self.access_token().await?;
        let url = format!("{}/{}/{}", self.base_url()?, API_PATH, path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0");
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, path = %path, "Dataverse request");
        Ok(request.send().await?)
    }

    /// Send and fail on any non-success status
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let response = self.send(method.clone(), path, body).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(&method, path, response).await)
        }
    }

    async fn fetch_entity(&self, logical_name: &str) -> Result<Option<EntityMetadata>> {
        let path = format!(
            "{}?$expand=Attributes,Keys,ManyToOneRelationships",
            entity_path(logical_name)
        );
        let response = self.send(Method::GET, &path, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(&Method::GET, &path, response).await);
        }

        let definition: EntityDefinition = response.json().await?;
        Ok(Some(definition.into_metadata()))
    }
}

#[async_trait]
impl MetadataSource for WebApiClient {
    async fn load(
        &self,
        entity_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<MetadataResult> {
        let names = normalize_entity_names(entity_names);
        let org_url = self.settings.base_url();

        if names.is_empty() {
            return Ok(MetadataResult::Connected(MetadataSnapshot::new(
                org_url,
                Vec::new(),
                Vec::new(),
            )));
        }
        if !self.settings.is_configured() {
            return Ok(MetadataResult::unavailable(org_url, NOT_CONFIGURED));
        }

        let authenticated = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.access_token() => result,
        };
        if let Err(e) = authenticated {
            warn!(error = %e, "Dataverse authentication failed");
            return Ok(MetadataResult::unavailable(
                org_url,
                format!("Dataverse metadata retrieval failed: {}", e),
            ));
        }

        let mut entities = Vec::new();
        let mut errors = Vec::new();

        for name in &names {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.fetch_entity(name) => result,
            };

            match fetched {
                Ok(Some(entity)) => {
                    debug!(
                        entity = %entity.logical_name,
                        attributes = entity.attributes.len(),
                        "Retrieved entity metadata"
                    );
                    entities.push(entity);
                }
                Ok(None) => debug!(entity = %name, "Entity not found in Dataverse"),
                Err(e) => errors.push(format!("Failed to retrieve metadata for '{}': {}", name, e)),
            }
        }

        info!(
            requested = names.len(),
            found = entities.len(),
            errors = errors.len(),
            "Loaded Dataverse metadata"
        );
        Ok(MetadataResult::Connected(MetadataSnapshot::new(
            org_url, entities, errors,
        )))
    }
}

#[async_trait]
impl EntityStore for WebApiClient {
    async fn create_attribute(&self, entity: &str, attribute: &NewAttribute) -> Result<()> {
        let path = format!("{}/Attributes", entity_path(entity));
        self.execute(Method::POST, &path, Some(&attribute_body(attribute)))
            .await?;
        Ok(())
    }

    async fn create_alternate_key(&self, entity: &str, key: &NewAlternateKey) -> Result<()> {
        let path = format!("{}/Keys", entity_path(entity));
        let body = json!({
            "SchemaName": key.schema_name,
            "LogicalName": key.logical_name,
            "DisplayName": label(&key.display_name),
            "KeyAttributes": key.key_attributes,
        });
        self.execute(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    async fn delete_attribute(&self, entity: &str, logical_name: &str) -> Result<()> {
        let path = format!(
            "{}/Attributes(LogicalName='{}')",
            entity_path(entity),
            odata_escape(logical_name)
        );
        self.execute(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn delete_relationship(&self, schema_name: &str) -> Result<()> {
        let path = format!(
            "RelationshipDefinitions(SchemaName='{}')",
            odata_escape(schema_name)
        );
        self.execute(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn delete_alternate_key(&self, entity: &str, logical_name: &str) -> Result<()> {
        let path = format!(
            "{}/Keys(LogicalName='{}')",
            entity_path(entity),
            odata_escape(logical_name)
        );
        self.execute(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn export_solution(&self, solution_name: &str) -> Result<Vec<u8>> {
        let body = json!({ "SolutionName": solution_name, "Managed": false });
        let response = self
            .execute(Method::POST, "ExportSolution", Some(&body))
            .await?;
        let exported: ExportSolutionResponse = response.json().await?;

        base64::engine::general_purpose::STANDARD
            .decode(exported.export_solution_file.as_bytes())
            .map_err(|e| Error::Remote(format!("Exported solution is not valid base64: {}", e)))
    }
}

fn odata_escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn entity_path(logical_name: &str) -> String {
    format!("EntityDefinitions(LogicalName='{}')", odata_escape(logical_name))
}

fn label(text: &str) -> Value {
    json!({
        "@odata.type": "Microsoft.Dynamics.CRM.Label",
        "LocalizedLabels": [{
            "@odata.type": "Microsoft.Dynamics.CRM.LocalizedLabel",
            "Label": text,
            "LanguageCode": LANGUAGE_CODE,
        }],
    })
}

fn decimal_bounds(precision: u32, scale: u32) -> (u32, f64) {
    let scale = scale.min(DECIMAL_MAX_SCALE);
    let integer_digits = precision.saturating_sub(scale) as i32;
    let max = 10f64.powi(integer_digits) - 10f64.powi(-(scale as i32));
    (scale, max.min(DECIMAL_LIMIT))
}

/// Request body for `POST EntityDefinitions(...)/Attributes`
pub fn attribute_body(attribute: &NewAttribute) -> Value {
    let mut body = json!({
        "@odata.type": format!("Microsoft.Dynamics.CRM.{}", attribute.kind.metadata_type()),
        "SchemaName": attribute.schema_name,
        "LogicalName": attribute.logical_name,
        "DisplayName": label(&attribute.display_name),
        "RequiredLevel": {
            "Value": if attribute.required { "ApplicationRequired" } else { "None" },
            "CanBeChanged": true,
            "ManagedPropertyLogicalName": "canmodifyrequirementlevelsettings",
        },
    });

    let extra = match attribute.kind {
        AttributeKind::Boolean => json!({
            "OptionSet": {
                "@odata.type": "Microsoft.Dynamics.CRM.BooleanOptionSetMetadata",
                "OptionSetType": "Boolean",
                "TrueOption": { "Value": 1, "Label": label("Yes") },
                "FalseOption": { "Value": 0, "Label": label("No") },
            },
        }),
        AttributeKind::Integer => json!({
            "Format": "None",
            "MinValue": i32::MIN,
            "MaxValue": i32::MAX,
        }),
        AttributeKind::Decimal { precision, scale } => {
            let (scale, max) = decimal_bounds(precision, scale);
            json!({ "Precision": scale, "MinValue": -max, "MaxValue": max })
        }
        AttributeKind::Double => json!({ "Precision": 2 }),
        AttributeKind::Money => json!({ "PrecisionSource": 2 }),
        AttributeKind::DateTime => json!({
            "Format": "DateAndTime",
            "DateTimeBehavior": { "Value": "UserLocal" },
        }),
        AttributeKind::DateOnly => json!({
            "Format": "DateOnly",
            "DateTimeBehavior": { "Value": "DateOnly" },
        }),
        AttributeKind::Memo { max_length } => json!({
            "Format": "TextArea",
            "MaxLength": max_length,
        }),
        AttributeKind::String { max_length } => json!({
            "FormatName": { "Value": "Text" },
            "MaxLength": max_length,
        }),
        AttributeKind::BigInt => json!({}),
    };

    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

/// Pull `error.message` out of a Dataverse or AAD error body
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error_description"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

async fn status_error(method: &Method, path: &str, response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::Remote(format!(
        "{} {} returned {}: {}",
        method,
        path,
        status,
        error_message(&body)
    ))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExportSolutionResponse {
    export_solution_file: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct DisplayLabel {
    user_localized_label: Option<LocalizedLabel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalizedLabel {
    label: String,
}

fn label_text(label: Option<DisplayLabel>) -> Option<String> {
    label
        .and_then(|l| l.user_localized_label)
        .map(|l| l.label)
        .filter(|text| !text.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TypeName {
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityDefinition {
    logical_name: String,
    schema_name: String,
    display_name: Option<DisplayLabel>,
    primary_id_attribute: Option<String>,
    attributes: Option<Vec<AttributeDefinition>>,
    keys: Option<Vec<KeyDefinition>>,
    many_to_one_relationships: Option<Vec<RelationshipDefinition>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttributeDefinition {
    logical_name: String,
    schema_name: Option<String>,
    display_name: Option<DisplayLabel>,
    attribute_type: Option<String>,
    attribute_type_name: Option<TypeName>,
    is_custom_attribute: Option<bool>,
    attribute_of: Option<String>,
    targets: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyDefinition {
    logical_name: String,
    key_attributes: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelationshipDefinition {
    schema_name: String,
    referencing_entity: String,
    referencing_attribute: String,
    referenced_entity: String,
    referenced_attribute: String,
    is_custom_relationship: Option<bool>,
}

impl EntityDefinition {
    fn into_metadata(self) -> EntityMetadata {
        let attributes = self
            .attributes
            .unwrap_or_default()
            .into_iter()
            // Virtual companions such as `ownerid` → `owneridname`
            .filter(|attribute| attribute.attribute_of.is_none())
            .map(|attribute| AttributeMetadata {
                attribute_type: attribute
                    .attribute_type_name
                    .map(|name| name.value)
                    .or(attribute.attribute_type)
                    .unwrap_or_else(|| "Unknown".to_string()),
                logical_name: attribute.logical_name,
                schema_name: attribute.schema_name,
                display_name: label_text(attribute.display_name),
                is_custom: attribute.is_custom_attribute.unwrap_or(false),
                targets: attribute.targets.unwrap_or_default(),
            })
            .collect();

        let alternate_keys = self
            .keys
            .unwrap_or_default()
            .into_iter()
            .map(|key| AlternateKey {
                logical_name: key.logical_name,
                key_attributes: key.key_attributes.unwrap_or_default(),
            })
            .collect();

        let relationships = self
            .many_to_one_relationships
            .unwrap_or_default()
            .into_iter()
            .map(|rel| RelationshipMetadata {
                schema_name: rel.schema_name,
                referencing_entity: rel.referencing_entity,
                referencing_attribute: rel.referencing_attribute,
                referenced_entity: rel.referenced_entity,
                referenced_attribute: rel.referenced_attribute,
                is_custom: rel.is_custom_relationship.unwrap_or(false),
            })
            .collect();

        EntityMetadata {
            primary_id_attribute: self
                .primary_id_attribute
                .unwrap_or_else(|| format!("{}id", self.logical_name)),
            logical_name: self.logical_name,
            schema_name: self.schema_name,
            display_name: label_text(self.display_name),
            attributes,
            alternate_keys,
            relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const TOKEN_BODY: &str = r#"{"access_token": "token-123", "expires_in": 3600}"#;

    fn settings(url: &str) -> ConnectionSettings {
        ConnectionSettings {
            org_url: Some(url.to_string()),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            tenant_id: Some("tenant".into()),
        }
    }

    fn client(server: &ServerGuard) -> WebApiClient {
        WebApiClient::new(settings(&server.url()))
            .unwrap()
            .with_authority_host(server.url())
    }

    async fn mock_token(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKEN_BODY)
            .create_async()
            .await
    }

    const INVOICES_DEFINITION: &str = r#"{
        "LogicalName": "invoices",
        "SchemaName": "cr8a1_Invoices",
        "PrimaryIdAttribute": "invoiceid",
        "DisplayName": {"UserLocalizedLabel": {"Label": "Invoice"}},
        "Attributes": [
            {"LogicalName": "invoiceid", "SchemaName": "InvoiceId", "AttributeType": "Uniqueidentifier",
             "AttributeTypeName": {"Value": "UniqueidentifierType"}, "IsCustomAttribute": false, "AttributeOf": null},
            {"LogicalName": "engagementid", "SchemaName": "cr8a1_EngagementId", "AttributeType": "String",
             "IsCustomAttribute": true, "AttributeOf": null},
            {"LogicalName": "cr8a1_customer", "SchemaName": "cr8a1_Customer", "AttributeType": "Lookup",
             "IsCustomAttribute": true, "AttributeOf": null, "Targets": ["account"]},
            {"LogicalName": "cr8a1_customername", "AttributeType": "String", "AttributeOf": "cr8a1_customer"}
        ],
        "Keys": [{"LogicalName": "cr8a1_number", "KeyAttributes": ["cr8a1_number"]}],
        "ManyToOneRelationships": [
            {"SchemaName": "cr8a1_invoice_customer", "ReferencingEntity": "invoices",
             "ReferencingAttribute": "cr8a1_customer", "ReferencedEntity": "account",
             "ReferencedAttribute": "accountid", "IsCustomRelationship": true}
        ]
    }"#;

    #[tokio::test]
    async fn loads_entities_and_reports_missing_as_absent() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server).await;
        let invoices = server
            .mock("GET", Matcher::Regex(r"EntityDefinitions\(LogicalName='invoices'\)".into()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(INVOICES_DEFINITION)
            .create_async()
            .await;
        let widgets = server
            .mock("GET", Matcher::Regex(r"EntityDefinitions\(LogicalName='widgets'\)".into()))
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"code": "0x80060888", "message": "Could not find entity"}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .load(
                &["invoices".to_string(), "widgets".to_string()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        token.assert_async().await;
        invoices.assert_async().await;
        widgets.assert_async().await;

        let snapshot = result.snapshot().unwrap();
        assert!(snapshot.errors.is_empty());
        assert!(snapshot.entity("widgets").is_none());

        let entity = snapshot.entity("invoices").unwrap();
        assert_eq!(entity.display_name.as_deref(), Some("Invoice"));
        assert_eq!(entity.attributes.len(), 3, "virtual attributes are dropped");
        assert_eq!(entity.attribute("invoiceid").unwrap().attribute_type, "UniqueidentifierType");
        assert_eq!(entity.attribute("cr8a1_customer").unwrap().targets, vec!["account"]);
        assert_eq!(entity.alternate_keys[0].key_attributes, vec!["cr8a1_number"]);
        assert!(entity.relationships[0].is_custom);
    }

    #[tokio::test]
    async fn server_errors_become_snapshot_errors() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", Matcher::Regex("EntityDefinitions".into()))
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error": {"message": "boom"}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .load(&["invoices".to_string()], &CancellationToken::new())
            .await
            .unwrap();

        let snapshot = result.snapshot().unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.errors[0].contains("boom"));
    }

    #[tokio::test]
    async fn failed_authentication_is_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error": "invalid_client", "error_description": "bad secret"}"#)
            .create_async()
            .await;

        let result = client(&server)
            .load(&["invoices".to_string()], &CancellationToken::new())
            .await
            .unwrap();

        match result {
            MetadataResult::Unavailable { reason, .. } => assert!(reason.contains("bad secret")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unconfigured_settings_are_unavailable() {
        let client = WebApiClient::new(ConnectionSettings::default()).unwrap();
        let result = client
            .load(&["invoices".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_connected());
        assert_eq!(result.warnings(), vec![NOT_CONFIGURED.to_string()]);
    }

    #[tokio::test]
    async fn creates_attribute_with_typed_body() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        let create = server
            .mock("POST", Matcher::Regex(r"EntityDefinitions\(LogicalName='invoices'\)/Attributes$".into()))
            .match_body(Matcher::PartialJson(json!({
                "@odata.type": "Microsoft.Dynamics.CRM.StringAttributeMetadata",
                "SchemaName": "cr8a1_Reference",
                "MaxLength": 64,
                "RequiredLevel": {"Value": "ApplicationRequired"},
            })))
            .with_status(204)
            .create_async()
            .await;

        let attribute = NewAttribute {
            logical_name: "cr8a1_reference".into(),
            schema_name: "cr8a1_Reference".into(),
            display_name: "Reference".into(),
            required: true,
            kind: AttributeKind::String { max_length: 64 },
        };
        client(&server)
            .create_attribute("invoices", &attribute)
            .await
            .unwrap();
        create.assert_async().await;
    }

    #[tokio::test]
    async fn delete_failure_carries_server_message() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("DELETE", Matcher::Regex(r"RelationshipDefinitions\(SchemaName='cr8a1_rel'\)".into()))
            .with_status(400)
            .with_body(r#"{"error": {"message": "relationship is managed"}}"#)
            .create_async()
            .await;

        let err = client(&server).delete_relationship("cr8a1_rel").await.unwrap_err();
        assert!(err.to_string().contains("relationship is managed"));
    }

    #[tokio::test]
    async fn export_solution_decodes_archive() {
        let mut server = Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("POST", "/api/data/v9.2/ExportSolution")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ExportSolutionFile": "UEsDBA=="}"#)
            .create_async()
            .await;

        let bytes = client(&server).export_solution("Core").await.unwrap();
        assert_eq!(bytes, b"PK\x03\x04".to_vec());
    }

    #[test]
    fn decimal_bounds_respect_platform_limits() {
        let (scale, max) = decimal_bounds(12, 2);
        assert_eq!(scale, 2);
        assert!((max - 9_999_999_999.99).abs() < 1e-3);

        let (_, capped) = decimal_bounds(18, 2);
        assert_eq!(capped, DECIMAL_LIMIT);
    }

    #[test]
    fn boolean_body_carries_option_set() {
        let body = attribute_body(&NewAttribute {
            logical_name: "cr8a1_isactive".into(),
            schema_name: "cr8a1_IsActive".into(),
            display_name: "IsActive".into(),
            required: false,
            kind: AttributeKind::Boolean,
        });
        assert_eq!(body["OptionSet"]["TrueOption"]["Value"], 1);
        assert_eq!(body["RequiredLevel"]["Value"], "None");
    }
}
