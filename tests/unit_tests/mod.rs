mod assembly;
mod fixtures;
mod lifecycle;
mod specification;
