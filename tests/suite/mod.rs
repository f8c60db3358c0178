mod binary;
mod fetch;
mod ordering;
