mod run;
mod store;
mod types;


pub(crate) use run::{resolve_db_path, run};
pub(crate) use store::{
    ensure_embedding_schema, ensure_model_entry, load_cached_embedding, open_cache_connection,
    upsert_text_embedding,
};
