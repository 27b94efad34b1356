// Mirrors migrations/2024-01-01-000000_create_tables/up.sql.

diesel::table! {
    energy_usage (id) {
        id -> BigInt,
        ts -> Double,
        period_type -> Text,
        period_year -> Integer,
        period_month -> Integer,
        period_day -> Integer,
        cooling -> Double,
        hpheat -> Double,
        fan -> Double,
        eheat -> Double,
        reheat -> Double,
        fangas -> Double,
        gas -> Double,
        looppump -> Double,
    }
}

diesel::table! {
    energy_period_usage (period_type, period_year, period_month, period_day) {
        period_type -> Text,
        period_year -> Integer,
        period_month -> Integer,
        period_day -> Integer,
        eu_id -> BigInt,
    }
}

diesel::table! {
    odu_status (id) {
        id -> BigInt,
        ts -> Timestamp,
        odutype -> Text,
        opstat -> Integer,
        opmode -> Text,
        iducfm -> Integer,
        lat -> Integer,
        oat -> Integer,
        oducoiltmp -> Integer,
        blwrpm -> Integer,
        linevolt -> Integer,
        lockactive -> Text,
        locktime -> Integer,
        comprpm -> Integer,
        suctpress -> Integer,
        sucttemp -> Integer,
        suctsupheat -> Double,
        dischargetmp -> Integer,
        sparesensorstatus -> Text,
        sparesensorvalue -> Integer,
        exvpos -> Integer,
        curtail -> Text,
        statpress -> Double,
        enterreftmp -> Integer,
        availminheatstage -> Integer,
        availmaxheatstage -> Integer,
        availmincoolstage -> Integer,
        availmaxcoolstage -> Integer,
        opminheatstage -> Integer,
        opmaxheatstage -> Integer,
        opmincoolstage -> Integer,
        opmaxcoolstage -> Integer,
        aclinecurrent -> Nullable<Double>,
        dcbusvoltage -> Nullable<Double>,
        dischargepressure -> Nullable<Double>,
        dischargesuperheat -> Nullable<Double>,
        exvposvi_unit -> Text,
        exvposvi_value -> Integer,
        ipmtemperature -> Nullable<Double>,
        lowambientcooling -> Text,
        pfcmtemperature -> Nullable<Double>,
        outdoorfanrpm -> Nullable<Double>,
    }
}

diesel::joinable!(energy_period_usage -> energy_usage (eu_id));

diesel::allow_tables_to_appear_in_same_query!(energy_usage, energy_period_usage, odu_status);
