// Route handlers, one module per resource.
//
// Public:        healthcheck, registration, activation, login
// Authenticated: current user, logout
// Permissioned:  movies (movies:read / movies:write)
pub mod extract;
pub mod fallback;
pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;
