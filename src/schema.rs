// Maintained alongside the migrations. `search_index.search_vector` is a
// generated tsvector column and is only touched through raw SQL, so it is
// left out of the table definition.

diesel::table! {
    outbox_events (id) {
        id -> Int8,
        #[max_length = 255]
        aggregate_id -> Varchar,
        #[max_length = 255]
        aggregate_type -> Varchar,
        #[max_length = 255]
        event_type -> Varchar,
        payload -> Jsonb,
        occurred_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
        published_at -> Nullable<Timestamptz>,
        retries -> Int4,
        max_retries -> Int4,
        error_message -> Nullable<Text>,
        #[max_length = 255]
        trace_id -> Nullable<Varchar>,
        #[max_length = 255]
        claimed_by -> Nullable<Varchar>,
        claimed_until -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    search_index (id) {
        id -> Int8,
        #[max_length = 255]
        entity_id -> Varchar,
        #[max_length = 32]
        entity_type -> Varchar,
        content -> Nullable<Text>,
        title -> Nullable<Text>,
        #[max_length = 255]
        author -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    search_index_tombstones (entity_id, entity_type) {
        #[max_length = 255]
        entity_id -> Varchar,
        #[max_length = 32]
        entity_type -> Varchar,
        deleted_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(outbox_events, search_index, search_index_tombstones,);
