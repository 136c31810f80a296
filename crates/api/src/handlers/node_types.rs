use axum::{extract::State, Json};

use nodes::NodeTypeDescriptor;

use crate::{envelope::Envelope, AppState};

pub async fn list(State(state): State<AppState>) -> Json<Envelope<Vec<NodeTypeDescriptor>>> {
    let registry = state.repository.registry();
    Json(Envelope::list(registry.list_node_types().to_vec()))
}
