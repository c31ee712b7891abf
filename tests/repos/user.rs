use crate::repos::common::*;

#[test]
#[ignore = "requires DATABASE_URL"]
fn insert_and_find_user() {
	let suite = Suite::setup();
	let user = suite.create_user("tom", Role::Employee);

	let got = suite.user_repo.find_user(user.id).unwrap();
	assert_eq!(got, Some(user));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn missing_user_is_none() {
	let suite = Suite::setup();
	assert_eq!(suite.user_repo.find_user(-1).unwrap(), None);
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn find_users_in_id_order() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);
	let jack = suite.create_user("jack", Role::Admin);

	assert_eq!(suite.user_repo.find_users().unwrap(), vec![vince, jack]);
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn update_user_fields() {
	let suite = Suite::setup();
	let vince = suite.create_user("vince", Role::Customer);
	let jack = suite.create_user("jack", Role::Customer);

	let changes = UserChanges { last_name: Some("Vance".to_string()), role: Some(Role::Employee), ..UserChanges::default() };
	let got = suite.user_repo.update_user(vince.id, &changes).unwrap().unwrap();
	assert_eq!((got.last_name.as_str(), got.role), ("Vance", Role::Employee));
	assert_eq!(got.email, vince.email);

	assert_eq!(suite.user_repo.update_user(vince.id, &UserChanges::default()).unwrap(), Some(got));
	assert_eq!(suite.user_repo.update_user(-1, &changes).unwrap(), None);

	let taken = UserChanges { username: Some("jack".to_string()), ..UserChanges::default() };
	assert_eq!(suite.user_repo.update_user(vince.id, &taken).unwrap_err(), db::Error::RecordAlreadyExists);
	assert_eq!(suite.user_repo.find_user(jack.id).unwrap(), Some(jack));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn authenticate_against_stored_hash() {
	let suite = Suite::setup();
	let hash = password::hash("s3cret").unwrap();
	let tom = suite.create_user_with_hash("tom", Role::Employee, &hash);

	let got = suite.user_repo.authenticate("tom", "s3cret").unwrap();
	assert_eq!(got, Some(Principal::new(tom.id, Role::Employee)));

	assert_eq!(suite.user_repo.authenticate("tom", "guess").unwrap(), None);
	assert_eq!(suite.user_repo.authenticate("nobody", "s3cret").unwrap(), None);
}
