//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use crate::error::PageError;
use crate::filters;
use crate::middleware::OptionalUser;
use crate::state::AppState;
use crate::views::{PageContext, ProductCard};

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub featured: Vec<ProductCard>,
    pub newest: Vec<ProductCard>,
    pub categories: Vec<String>,
}

/// Display the home page: featured row, newest row and category chips.
#[instrument(skip(state))]
pub async fn home(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Result<impl IntoResponse, PageError> {
    let content = state.catalog().home().await?;

    Ok(HomeTemplate {
        page: PageContext::new(&state, user),
        featured: content.featured.iter().map(ProductCard::from).collect(),
        newest: content.newest.iter().map(ProductCard::from).collect(),
        categories: content.categories.clone(),
    })
}
