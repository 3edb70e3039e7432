use shared_types::GraphStats;

/// Most edges quoted in one prompt.
pub const MAX_PROMPT_EDGES: usize = 60;

/// Prompt asking for a prose account of one document's graph.
#[must_use]
pub fn narrative_prompt(doc_id: &str, stats: &GraphStats) -> String {
    let entities = stats
        .nodes
        .iter()
        .map(|n| format!("- {} ({})", n.id, n.node_type))
        .collect::<Vec<_>>()
        .join("\n");
    let mut relations = stats
        .edges
        .iter()
        .take(MAX_PROMPT_EDGES)
        .map(|e| format!("- {} {} {}", e.source, e.relation_type, e.target))
        .collect::<Vec<_>>()
        .join("\n");
    if stats.edges.len() > MAX_PROMPT_EDGES {
        relations.push_str(&format!("\n- ... {} more", stats.edges.len() - MAX_PROMPT_EDGES));
    }

    format!(
        "You are an intelligence analyst. Write a concise narrative (one to three \
         paragraphs) explaining what document \"{doc_id}\" reveals.\n\n\
         Entities:\n{entities}\n\n\
         Relationships:\n{relations}\n\n\
         Use only the facts above. Return plain prose, no headings or lists."
    )
}
