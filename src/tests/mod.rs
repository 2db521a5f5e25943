mod chat;
mod support;
mod web;
