//! ABOUTME: Middleware modules for authentication and authorization
//! ABOUTME: JWT verification and role checks applied per route scope

pub mod auth;
pub mod rbac;
