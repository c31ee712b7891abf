table! {
    credentials (user_id) {
        user_id -> Int4,
        password_hash -> Varchar,
    }
}

table! {
    accounts (id) {
        id -> Int4,
        balance -> Numeric,
        status_id -> Int4,
        type_id -> Int4,
    }
}

table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        email -> Varchar,
        role_id -> Int4,
    }
}

table! {
    users_accounts (user_id, account_id) {
        user_id -> Int4,
        account_id -> Int4,
    }
}

joinable!(credentials -> users (user_id));
joinable!(users_accounts -> accounts (account_id));
joinable!(users_accounts -> users (user_id));

allow_tables_to_appear_in_same_query!(
    accounts,
    credentials,
    users,
    users_accounts,
);
