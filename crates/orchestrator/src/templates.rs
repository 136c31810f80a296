//! Built-in workflow templates.
//!
//! A template is a ready-made graph.  [`TemplateCatalog::draft`] deep-copies
//! it into a [`NewWorkflow`]; [`TemplateCatalog::instantiate`] persists that
//! draft through the repository, which validates it like any other create.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use nodes::{ConfigValue, NodeConfig};

use crate::{
    EngineError,
    models::{
        Difficulty, NewWorkflow, WorkflowDefinition, WorkflowEdge, WorkflowMetadata, WorkflowNode,
    },
    repository::WorkflowRepository,
};

/// Listing view of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub estimated_time: String,
    pub node_count: usize,
    pub version: String,
}

struct Template {
    id: &'static str,
    difficulty: Difficulty,
    workflow: NewWorkflow,
}

impl Template {
    fn summary(&self) -> WorkflowTemplate {
        let meta = &self.workflow.metadata;
        WorkflowTemplate {
            id: self.id.to_owned(),
            name: self.workflow.name.clone(),
            description: self.workflow.description.clone(),
            category: meta.category.clone().unwrap_or_default(),
            difficulty: self.difficulty,
            estimated_time: meta.estimated_time.clone().unwrap_or_default(),
            node_count: self.workflow.nodes.len(),
            version: self.workflow.version.clone(),
        }
    }
}

/// Read-only set of templates, fixed at construction.
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// The four built-in content pipelines.
    pub fn builtin() -> Self {
        Self {
            templates: vec![blog_post(), social_media(), story_creation(), product_marketing()],
        }
    }

    pub fn list_templates(&self) -> Vec<WorkflowTemplate> {
        self.templates.iter().map(Template::summary).collect()
    }

    /// A fresh copy of the template's graph, ready to be created.
    /// Node ids are kept so edges stay valid.
    pub fn draft(&self, template_id: &str) -> Result<NewWorkflow, EngineError> {
        let template = self
            .templates
            .iter()
            .find(|t| t.id == template_id)
            .ok_or_else(|| EngineError::not_found("template", template_id))?;

        let mut draft = template.workflow.clone();
        draft.metadata.created_from_template = Some(template.id.to_owned());
        Ok(draft)
    }

    #[instrument(skip(self, repository))]
    pub async fn instantiate(
        &self,
        template_id: &str,
        repository: &WorkflowRepository,
    ) -> Result<WorkflowDefinition, EngineError> {
        let draft = self.draft(template_id)?;
        let definition = repository.create(draft).await?;
        info!(workflow_id = %definition.id, "template instantiated");
        Ok(definition)
    }
}

// ---------------------------------------------------------------------------
// Template definitions
// ---------------------------------------------------------------------------

fn node(
    id: &str,
    node_type: &str,
    name: &str,
    description: &str,
    (x, y): (i64, i64),
) -> WorkflowNode {
    WorkflowNode::new(id, node_type, name)
        .describe(description)
        .at(x, y)
}

fn config(fields: &[(&str, ConfigValue)]) -> NodeConfig {
    fields
        .iter()
        .map(|(field, value)| ((*field).to_owned(), value.clone()))
        .collect()
}

fn edges(pairs: &[(&str, &str)]) -> Vec<WorkflowEdge> {
    pairs.iter().map(|(from, to)| WorkflowEdge::new(*from, *to)).collect()
}

#[allow(clippy::too_many_arguments)]
fn template(
    id: &'static str,
    name: &str,
    description: &str,
    category: &str,
    difficulty: Difficulty,
    estimated_time: &str,
    nodes: Vec<WorkflowNode>,
    edges: Vec<WorkflowEdge>,
) -> Template {
    let mut workflow = NewWorkflow::new(name, nodes, edges);
    workflow.description = description.to_owned();
    workflow.metadata = WorkflowMetadata {
        category: Some(category.to_owned()),
        difficulty: Some(difficulty),
        estimated_time: Some(estimated_time.to_owned()),
        ..WorkflowMetadata::default()
    };
    Template {
        id,
        difficulty,
        workflow,
    }
}

fn blog_post() -> Template {
    template(
        "blog_post_workflow",
        "Blog post generation",
        "Writes a blog post with an illustration and optimisation suggestions",
        "content_creation",
        Difficulty::Beginner,
        "5-10 minutes",
        vec![
            node("input_topic", "input", "Topic", "Blog post topic", (100, 100)).with_config(
                config(&[(
                    "input_fields",
                    vec!["topic", "target_audience", "tone"].into(),
                )]),
            ),
            node(
                "generate_outline",
                "text_generation",
                "Outline",
                "Draft an outline for the topic",
                (300, 100),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Write a detailed blog post outline on '{topic}' \
                     for {target_audience}, in a {tone} tone."
                        .into(),
                ),
                ("max_length", 300i64.into()),
                ("temperature", 0.7.into()),
            ])),
            node(
                "generate_content",
                "text_generation",
                "Article",
                "Expand the outline into a full post",
                (500, 100),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Write a complete blog post from this outline: {text}".into(),
                ),
                ("max_length", 2000i64.into()),
                ("temperature", 0.8.into()),
            ])),
            node(
                "generate_image",
                "image_generation",
                "Illustration",
                "Illustrate the post",
                (700, 100),
            )
            .with_config(config(&[
                ("prompt", "An illustration for the blog post '{topic}'".into()),
                ("style", "professional".into()),
                ("width", 800i64.into()),
                ("height", 600i64.into()),
            ])),
            node(
                "analyze_content",
                "content_analysis",
                "Analysis",
                "Analyse the article",
                (500, 300),
            )
            .with_config(config(&[("analysis_type", "comprehensive".into())])),
            node(
                "optimize_content",
                "content_optimization",
                "Optimisation",
                "Optimise the article",
                (700, 300),
            )
            .with_config(config(&[
                ("platform", "blog".into()),
                ("optimization_level", "high".into()),
            ])),
            node("output_result", "output", "Result", "The finished blog post", (900, 200))
                .with_config(config(&[(
                    "output_fields",
                    vec!["optimized_content", "image_url", "suggested_tags"].into(),
                )])),
        ],
        edges(&[
            ("input_topic", "generate_outline"),
            ("generate_outline", "generate_content"),
            ("input_topic", "generate_image"),
            ("generate_content", "analyze_content"),
            ("analyze_content", "optimize_content"),
            ("optimize_content", "output_result"),
            ("generate_image", "output_result"),
        ]),
    )
}

fn social_media() -> Template {
    template(
        "social_media_workflow",
        "Social media post",
        "Copy, visual and soundtrack for a social post, optimised and published",
        "social_media",
        Difficulty::Intermediate,
        "3-8 minutes",
        vec![
            node("input_idea", "input", "Idea", "The post idea", (100, 100)).with_config(config(
                &[("input_fields", vec!["idea", "platform", "style"].into())],
            )),
            node("generate_copy", "text_generation", "Copy", "Write the post copy", (300, 100))
                .with_config(config(&[
                    (
                        "prompt",
                        "Write a {style} post for {platform} about '{idea}'".into(),
                    ),
                    ("max_length", 500i64.into()),
                    ("temperature", 0.9.into()),
                ])),
            node(
                "generate_visual",
                "image_generation",
                "Visual",
                "Square image for the post",
                (300, 300),
            )
            .with_config(config(&[
                ("style", "social_media".into()),
                ("width", 1080i64.into()),
                ("height", 1080i64.into()),
            ])),
            node(
                "generate_music",
                "music_generation",
                "Background music",
                "Short background track",
                (300, 500),
            )
            .with_config(config(&[
                ("duration", 15i64.into()),
                ("style", "upbeat".into()),
            ])),
            node(
                "analyze_content",
                "content_analysis",
                "Analysis",
                "Analyse copy and visual",
                (500, 200),
            ),
            node(
                "optimize_for_platform",
                "content_optimization",
                "Platform fit",
                "Tune the post for the platform",
                (700, 200),
            )
            .with_config(config(&[(
                "optimization_level",
                "platform_specific".into(),
            )])),
            node(
                "publish_content",
                "platform_publish",
                "Publish",
                "Publish to the platform",
                (900, 200),
            )
            .with_config(config(&[("auto_publish", false.into())])),
        ],
        edges(&[
            ("input_idea", "generate_copy"),
            ("input_idea", "generate_visual"),
            ("input_idea", "generate_music"),
            ("generate_copy", "analyze_content"),
            ("generate_visual", "analyze_content"),
            ("analyze_content", "optimize_for_platform"),
            ("optimize_for_platform", "publish_content"),
            ("generate_music", "publish_content"),
        ]),
    )
}

fn story_creation() -> Template {
    template(
        "story_creation_workflow",
        "Story creation",
        "Characters, plot, full story, illustrations and a soundtrack",
        "creative_writing",
        Difficulty::Advanced,
        "10-20 minutes",
        vec![
            node(
                "input_story_concept",
                "input",
                "Concept",
                "The core idea of the story",
                (100, 100),
            )
            .with_config(config(&[(
                "input_fields",
                vec!["genre", "main_character", "setting", "conflict"].into(),
            )])),
            node(
                "develop_characters",
                "text_generation",
                "Characters",
                "Flesh out the protagonist",
                (300, 50),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Develop a detailed background and personality for {main_character}, \
                     the lead of a {genre} story"
                        .into(),
                ),
                ("max_length", 800i64.into()),
                ("temperature", 0.8.into()),
            ])),
            node(
                "create_plot_outline",
                "text_generation",
                "Plot outline",
                "Outline the plot",
                (300, 150),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Outline the plot of a {genre} story set in {setting} \
                     whose central conflict is {conflict}"
                        .into(),
                ),
                ("max_length", 1000i64.into()),
                ("temperature", 0.7.into()),
            ])),
            node("write_story", "text_generation", "Story", "Write the full story", (500, 100))
                .with_config(config(&[
                    (
                        "prompt",
                        "Write a complete short story from these characters: {text} \
                         and the plot outline"
                            .into(),
                    ),
                    ("max_length", 3000i64.into()),
                    ("temperature", 0.9.into()),
                ])),
            node(
                "create_illustrations",
                "image_generation",
                "Illustrations",
                "Illustrate key scenes",
                (700, 50),
            )
            .with_config(config(&[
                ("style", "illustration".into()),
                ("width", 768i64.into()),
                ("height", 1024i64.into()),
            ])),
            node(
                "create_soundtrack",
                "music_generation",
                "Soundtrack",
                "Background score",
                (700, 150),
            )
            .with_config(config(&[
                ("duration", 120i64.into()),
                ("style", "cinematic".into()),
            ])),
            node(
                "analyze_story",
                "content_analysis",
                "Story analysis",
                "Themes and emotional arc",
                (500, 300),
            )
            .with_config(config(&[("analysis_type", "literary".into())])),
            node(
                "compile_story_package",
                "output",
                "Story package",
                "Everything bundled together",
                (900, 150),
            )
            .with_config(config(&[(
                "output_fields",
                vec!["story_text", "illustrations", "soundtrack", "analysis"].into(),
            )])),
        ],
        edges(&[
            ("input_story_concept", "develop_characters"),
            ("input_story_concept", "create_plot_outline"),
            ("develop_characters", "write_story"),
            ("create_plot_outline", "write_story"),
            ("write_story", "create_illustrations"),
            ("write_story", "create_soundtrack"),
            ("write_story", "analyze_story"),
            ("create_illustrations", "compile_story_package"),
            ("create_soundtrack", "compile_story_package"),
            ("analyze_story", "compile_story_package"),
        ]),
    )
}

fn product_marketing() -> Template {
    template(
        "product_marketing_workflow",
        "Product marketing",
        "Market analysis, copy, visuals and ad music, published to several platforms",
        "marketing",
        Difficulty::Intermediate,
        "8-15 minutes",
        vec![
            node(
                "input_product_info",
                "input",
                "Product",
                "Basic product information",
                (100, 100),
            )
            .with_config(config(&[(
                "input_fields",
                vec![
                    "product_name",
                    "features",
                    "target_market",
                    "unique_selling_points",
                ]
                .into(),
            )])),
            node(
                "market_analysis",
                "text_generation",
                "Market analysis",
                "Analyse the target market",
                (300, 50),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Analyse the {target_market} market for {product_name}, \
                     focusing on {unique_selling_points}"
                        .into(),
                ),
                ("max_length", 600i64.into()),
                ("temperature", 0.6.into()),
            ])),
            node(
                "generate_marketing_copy",
                "text_generation",
                "Marketing copy",
                "Write the product copy",
                (300, 150),
            )
            .with_config(config(&[
                (
                    "prompt",
                    "Write marketing copy for {product_name} aimed at {target_market}, \
                     highlighting {features} and {unique_selling_points}"
                        .into(),
                ),
                ("max_length", 800i64.into()),
                ("temperature", 0.8.into()),
            ])),
            node(
                "create_product_visuals",
                "image_generation",
                "Product visuals",
                "Product showcase images",
                (500, 50),
            )
            .with_config(config(&[
                ("style", "product_photography".into()),
                ("width", 1200i64.into()),
                ("height", 800i64.into()),
            ])),
            node(
                "create_ad_music",
                "music_generation",
                "Ad music",
                "Music for the advert",
                (500, 150),
            )
            .with_config(config(&[
                ("duration", 30i64.into()),
                ("style", "commercial".into()),
            ])),
            node(
                "optimize_marketing_content",
                "content_optimization",
                "Optimise",
                "Tune the campaign content",
                (700, 100),
            )
            .with_config(config(&[
                ("platform", "marketing".into()),
                ("optimization_level", "conversion_focused".into()),
            ])),
            node(
                "multi_platform_publish",
                "platform_publish",
                "Publish everywhere",
                "Publish to several platforms",
                (900, 100),
            )
            .with_config(config(&[
                ("platforms", vec!["xiaohongshu", "weibo", "douyin"].into()),
                ("auto_publish", false.into()),
            ])),
        ],
        edges(&[
            ("input_product_info", "market_analysis"),
            ("input_product_info", "generate_marketing_copy"),
            ("input_product_info", "create_product_visuals"),
            ("generate_marketing_copy", "create_ad_music"),
            ("market_analysis", "optimize_marketing_content"),
            ("generate_marketing_copy", "optimize_marketing_content"),
            ("create_product_visuals", "optimize_marketing_content"),
            ("create_ad_music", "optimize_marketing_content"),
            ("optimize_marketing_content", "multi_platform_publish"),
        ]),
    )
}
