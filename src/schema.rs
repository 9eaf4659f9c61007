// Kept in sync by hand with the DDL in `db::provision`.

diesel::table! {
    state_vectors (icao24, last_contact) {
        icao24 -> Text,
        callsign -> Nullable<Text>,
        origin_country -> Text,
        time_position -> Nullable<BigInt>,
        last_contact -> BigInt,
        longitude -> Nullable<Double>,
        latitude -> Nullable<Double>,
        baro_altitude -> Nullable<Double>,
        on_ground -> Bool,
        velocity -> Nullable<Double>,
        true_track -> Nullable<Double>,
        vertical_rate -> Nullable<Double>,
        sensors -> Nullable<Text>,
        geo_altitude -> Nullable<Double>,
        squawk -> Nullable<Text>,
        spi -> Bool,
        position_source -> Nullable<Integer>,
        fetch_time -> Timestamp,
    }
}
