use std::env;
use std::process;
use std::sync::Arc;

use log::*;
use pretty_env_logger;
use warp::Filter;
use warp::filters::log::Info;

use bank_engine::{account, api, db, password, user};
use bank_engine::{Config, NewService, NewUser, Registry, Role, Service, UserStore};
use bank_engine::config::AdminLogin;

#[tokio::main]
async fn main() {
	if env::var_os("RUST_LOG").is_none() {
		env::set_var("RUST_LOG", "info");
	}
	pretty_env_logger::init();

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!(target: "bank::api", "invalid configuration: {}", e);
			process::exit(2);
		}
	};

	let pool = match db::pg_connection(&config) {
		Ok(pool) => pool,
		Err(e) => {
			error!(target: "bank::api", "could not connect to the database: {}", e);
			process::exit(1);
		}
	};

	let users = Arc::new(user::Repo::new(pool.clone()));
	if let Some(admin) = &config.admin {
		seed_admin(&users, admin);
	}

	let service = Service::new(NewService {
		accounts: Arc::new(account::Repo::new(pool)),
		users: users.clone(),
		authenticator: users,
		sessions: Arc::new(Registry::new()),
		retries: config.store_retries,
	});
	let ctx = Arc::new(api::Context {
		service: Arc::new(service),
		savings_rate: config.savings_rate.clone(),
	});

	let log = warp::log::custom(|info: Info| {
		info!(
			target: "bank::api",
			"\"{} {} {:?}\" \t{} {} {:?}",
			info.method(),
			info.path(),
			info.version(),
			info.status().canonical_reason().unwrap_or_else(|| "-"),
			info.status().as_u16(),
			info.elapsed(),
		);
	});
	let routes = api::routes(ctx).with(log);

	info!(target: "bank::api", "listening on {}", config.bind_addr);
	warp::serve(routes).run(config.bind_addr).await;
}

/// Create the configured administrator unless the username is already taken
fn seed_admin(users: &user::Repo, admin: &AdminLogin) {
	let hash = match password::hash(&admin.password) {
		Ok(hash) => hash,
		Err(e) => {
			error!(target: "bank::auth", "could not hash the administrator password: {}", e);
			process::exit(2);
		}
	};
	let email = format!("{}@localhost", admin.username);
	let new_user = NewUser {
		username: &admin.username,
		first_name: &admin.username,
		last_name: "Administrator",
		email: &email,
		role: Role::Admin,
	};

	match users.create_user(&new_user, &hash) {
		Ok(user) => info!(target: "bank::auth", "created administrator {} (user {})", user.username, user.id),
		Err(db::Error::RecordAlreadyExists) => info!(target: "bank::auth", "user {} already exists, not seeded", admin.username),
		Err(e) => {
			error!(target: "bank::auth", "could not create the administrator: {}", e);
			process::exit(1);
		}
	}
}
