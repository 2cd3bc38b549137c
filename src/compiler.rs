//! Query compiler
//!
//! Drives one compilation end to end: parse groups, build each item's
//! predicate, AND within a group and OR across groups, layer in the global
//! overrides and extension columns, apply the default subscriber constraint
//! and extract the SQL template.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builders::{self, BuildContext};
use crate::catalog::FilterCatalog;
use crate::columns::{ExtensionRegistry, MemorySearchColumnStore, SearchColumnStore};
use crate::config::CompilerConfig;
use crate::contacts::ContactLog;
use crate::error::{Result, SearchError, ValidationError};
use crate::geo::Geocoder;
use crate::params::QueryParams;
use crate::parser::parse_groups;
use crate::plan::{LikeTarget, OutputColumn, Predicate, QueryPlan, UserColumn};
use crate::sql::{CaptureBackend, IdentifierSet, SentinelCapture, SqlRenderer};

pub const USER_NAME: &str = "user_name";
pub const USER_EMAIL: &str = "user_email";
pub const USER_AKID: &str = "user_akid";
pub const COLUMN: &str = "column";
pub const SUBSCRIPTION_ALL_USERS: &str = "subscription_all_users";

/// Profile fields projected into report output
const REPORT_FIELDS: &[&str] = &["campus", "skills", "engagement_level", "affiliation"];

/// Output of a compilation, ready for the reporting service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub human_query: String,
    /// The request exactly as received
    pub original_parameters: String,
    /// Statement text with one placeholder for the runtime identifier set
    pub sql_template: String,
}

/// Plan and description before template extraction
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledQuery {
    pub plan: QueryPlan,
    pub human_query: String,
}

/// Caller hook applied to the plan after the empty-request guard
pub type PlanModifier = Arc<dyn Fn(QueryPlan) -> QueryPlan + Send + Sync>;

pub struct QueryCompiler {
    catalog: Arc<FilterCatalog>,
    geocoder: Arc<dyn Geocoder>,
    contacts: Arc<dyn ContactLog>,
    columns: Arc<dyn SearchColumnStore>,
    extensions: Arc<ExtensionRegistry>,
    config: CompilerConfig,
    capture: Option<Arc<dyn CaptureBackend>>,
    modifier: Option<PlanModifier>,
}

impl QueryCompiler {
    /// Compiler with the standard extension kinds, an empty column catalog and default settings
    pub fn new(
        catalog: Arc<FilterCatalog>,
        geocoder: Arc<dyn Geocoder>,
        contacts: Arc<dyn ContactLog>,
    ) -> Self {
        Self {
            catalog,
            geocoder,
            contacts,
            columns: Arc::new(MemorySearchColumnStore::default()),
            extensions: Arc::new(ExtensionRegistry::standard()),
            config: CompilerConfig::default(),
            capture: None,
            modifier: None,
        }
    }

    pub fn with_columns(mut self, columns: Arc<dyn SearchColumnStore>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract templates by sentinel capture through `backend` instead of direct rendering
    pub fn with_capture_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.capture = Some(backend);
        self
    }

    pub fn with_plan_modifier(mut self, modifier: PlanModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a URL-encoded request
    pub async fn compile(&self, querystring: &str) -> Result<CompiledQuery> {
        let params = QueryParams::parse(querystring);
        self.compile_with(&params, querystring.to_string()).await
    }

    /// Compile an already decoded request
    pub async fn compile_params(&self, params: &QueryParams) -> Result<CompiledQuery> {
        self.compile_with(params, params.to_querystring()).await
    }

    async fn compile_with(&self, params: &QueryParams, original: String) -> Result<CompiledQuery> {
        let assembled = self.assemble(params).await?;
        let sql_template = self.template(&assembled.plan).await?;

        info!(
            template_len = sql_template.len(),
            captured = self.capture.is_some(),
            "Compiled user search"
        );

        Ok(CompiledQuery {
            human_query: assembled.human_query,
            original_parameters: original,
            sql_template,
        })
    }

    /// Build the plan and its description without extracting a template
    pub async fn assemble(&self, params: &QueryParams) -> Result<AssembledQuery> {
        let groups = parse_groups(params, &self.catalog)?;
        debug!(groups = groups.len(), "Parsed filter groups");

        let ctx = BuildContext {
            geocoder: self.geocoder.as_ref(),
            contacts: self.contacts.as_ref(),
        };

        let mut selection = Predicate::Nothing;
        let mut group_texts = Vec::new();

        for group in &groups {
            let mut current = Predicate::All;
            let mut fragments = Vec::new();

            for item in &group.items {
                let spec = self
                    .catalog
                    .get(&item.name)
                    .ok_or_else(|| ValidationError::UnknownFilter {
                        name: item.name.clone(),
                    })?;
                let (next, human) = builders::apply(ctx, current, spec, item).await?;
                current = next;
                fragments.push(human);
            }

            if fragments.is_empty() || current.is_unfiltered() {
                debug!(group = %group.key, "Group narrows nothing, dropping it");
                continue;
            }

            selection = selection.or(current);
            group_texts.push(format!("({})", fragments.join(" and ")));
        }

        if group_texts.is_empty() {
            selection = Predicate::All;
        }

        let mut human_query = group_texts.join("\n or ");
        let mut plan = QueryPlan::baseline().filter(selection);

        plan = self.apply_overrides(params, plan, &mut human_query)?;

        if self.config.report_columns {
            plan = plan.with_columns(report_columns());
        }

        plan = self.apply_extensions(params, plan, &mut human_query).await?;

        if plan == QueryPlan::baseline() {
            warn!("Request does not narrow the user table, compiling an empty result");
            plan = plan.none();
        }

        if let Some(modifier) = &self.modifier {
            plan = modifier(plan);
        }

        if !bypasses_subscription(params) {
            plan = plan.filter(Predicate::ColumnEquals {
                column: UserColumn::SubscriptionStatus,
                value: self.config.subscribed_status.clone(),
            });
            human_query.push_str(&format!(
                "\n and subscription_status is '{}'",
                self.config.subscribed_status
            ));
        }

        Ok(AssembledQuery {
            plan: plan.distinct(),
            human_query,
        })
    }

    /// Name and email match either one; the id list is conjoined on its own
    fn apply_overrides(
        &self,
        params: &QueryParams,
        mut plan: QueryPlan,
        human_query: &mut String,
    ) -> Result<QueryPlan> {
        let mut text_match = Predicate::Nothing;

        if let Some(name) = non_blank(params, USER_NAME) {
            text_match = text_match.or(Predicate::Like {
                target: LikeTarget::FullName,
                pattern: name_pattern(name),
            });
            human_query.push_str(&format!("\n and name is like \"{}\"", name));
        }

        if let Some(email) = non_blank(params, USER_EMAIL) {
            text_match = text_match.or(Predicate::Like {
                target: LikeTarget::Email,
                pattern: format!("%{}%", email.trim()),
            });
            human_query.push_str(&format!("\n and email is like \"{}\"", email));
        }

        if text_match != Predicate::Nothing {
            plan = plan.filter(text_match);
        }

        if let Some(raw) = non_blank(params, USER_AKID) {
            let ids = parse_user_ids(raw)?;
            let listed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            human_query.push_str(&format!("\n and AKID is in [{}]", listed.join(", ")));
            plan = plan.filter(Predicate::IdIn(ids));
        }

        Ok(plan)
    }

    async fn apply_extensions(
        &self,
        params: &QueryParams,
        mut plan: QueryPlan,
        human_query: &mut String,
    ) -> Result<QueryPlan> {
        let names: Vec<String> = params
            .get_list(COLUMN)
            .into_iter()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Ok(plan);
        }

        let columns = self
            .columns
            .load_columns(&names)
            .await
            .map_err(SearchError::ColumnCatalog)?;

        for column in &columns {
            let extension = self.extensions.load(column)?;
            debug!(column = %column.name, kind = %column.kind, "Applying extension column");
            plan = plan.filter(extension.filter());
            human_query.push_str(&format!("\n and {}", extension.describe()));
        }

        Ok(plan)
    }

    async fn template(&self, plan: &QueryPlan) -> Result<String> {
        match &self.capture {
            Some(backend) => {
                let capture = SentinelCapture::new(self.config.sentinel_id, self.config.placeholder.clone());
                Ok(capture.extract(plan, backend.as_ref()).await?)
            }
            None => Ok(SqlRenderer::render(
                plan,
                IdentifierSet::Placeholder(&self.config.placeholder),
            )),
        }
    }
}

fn non_blank<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
    params.get(key).filter(|v| !v.trim().is_empty())
}

fn report_columns() -> Vec<OutputColumn> {
    let mut columns = vec![OutputColumn::Phone, OutputColumn::FullName];
    columns.extend(REPORT_FIELDS.iter().map(|f| OutputColumn::UserField(f.to_string())));
    columns
}

/// `%` + words joined by `%` + `%`, so "jane doe" also matches "Jane Q. Doe"
fn name_pattern(name: &str) -> String {
    format!("%{}%", name.split_whitespace().collect::<Vec<_>>().join("%"))
}

/// Comma-separated ids; blank segments are skipped
fn parse_user_ids(raw: &str) -> std::result::Result<Vec<i64>, ValidationError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| ValidationError::InvalidUserId {
                value: s.to_string(),
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(ValidationError::InvalidUserId {
            value: raw.to_string(),
        });
    }
    Ok(ids)
}

/// Any non-empty value other than `0` or `false` lifts the subscriber constraint
fn bypasses_subscription(params: &QueryParams) -> bool {
    match params.get(SUBSCRIPTION_ALL_USERS).map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(v) => !v.eq_ignore_ascii_case("false"),
    }
}
