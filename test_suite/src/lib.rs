mod composition;
mod derive;
mod endpoint;
mod schema;
mod search;
