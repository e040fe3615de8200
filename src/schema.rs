// Arbolado schema - census tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    provincia (id_provincia) {
        id_provincia -> Integer,
        nombre -> Text,
    }
}

diesel::table! {
    municipio (id_municipio) {
        id_municipio -> Integer,
        id_provincia -> Integer,
        nombre -> Text,
        latitud -> Nullable<Double>,
        longitud -> Nullable<Double>,
    }
}

diesel::table! {
    especie (id_especie) {
        id_especie -> Integer,
        nombre_cientifico -> Text,
        nombre_comun -> Text,
        origen -> Text,
    }
}

diesel::table! {
    role (id_role) {
        id_role -> Integer,
        role_name -> Text,
        can_manage_users -> Bool,
        can_manage_all_relevamientos -> Bool,
        can_create_relevamientos -> Bool,
        can_modify_own_relevamientos -> Bool,
        can_generate_reports -> Bool,
        can_manage_municipio_data -> Bool,
    }
}

diesel::table! {
    usuario (id_usuario) {
        id_usuario -> Integer,
        id_municipio -> Integer,
        id_role -> Integer,
        nombre -> Text,
        email -> Text,
        is_active -> Bool,
        is_superuser -> Bool,
        date_joined -> Date,
        created_by -> Nullable<Integer>,
    }
}

// ============================================================================
// Lookup Tables
// ============================================================================

diesel::table! {
    altura (id_altura) {
        id_altura -> Integer,
        rango_altura -> Text,
    }
}

diesel::table! {
    diametrotronco (id_diametro) {
        id_diametro -> Integer,
        rango_diametro -> Text,
    }
}

diesel::table! {
    estadofitosanitario (id_estado) {
        id_estado -> Integer,
        nombre_estado -> Text,
    }
}

diesel::table! {
    condicionescrecimiento (id_condicion) {
        id_condicion -> Integer,
        nombre_condicion -> Text,
    }
}

diesel::table! {
    tipointerferencia (id_tipo_interferencia) {
        id_tipo_interferencia -> Integer,
        nombre_tipo -> Text,
    }
}

// ============================================================================
// Census Tables
// ============================================================================

diesel::table! {
    arbol (id_arbol) {
        id_arbol -> Integer,
        id_especie -> Integer,
        id_municipio -> Integer,
        ubicacion -> Nullable<Text>,         // "lat, long"
        calle -> Nullable<Text>,
        numero_aprox -> Nullable<Integer>,
        identificacion -> Nullable<Text>,
        barrio -> Nullable<Text>,
        altura -> Nullable<Text>,
        diametro_tronco -> Nullable<Text>,
        id_estado_copa -> Nullable<Integer>,
        id_estado_tronco -> Nullable<Integer>,
        id_estado_base -> Nullable<Integer>,
        id_condicion -> Nullable<Integer>,
        ambito -> Nullable<Text>,
        ancho_vereda -> Nullable<Double>,
        distancia_otros_ejemplares -> Nullable<Double>,
        distancia_cordon -> Nullable<Double>,
        interferencia_aerea -> Nullable<Text>,
        especificacion_interferencia -> Nullable<Text>,
        tipo_cableado -> Nullable<Text>,
        requiere_intervencion -> Bool,
        tipo_intervencion -> Nullable<Text>,
        tratamiento_previo -> Nullable<Text>,
        cazuela -> Nullable<Text>,
        protegido -> Bool,
        detalles_arbol -> Nullable<Text>,
        absorcion_co2 -> Nullable<Double>,
        edad -> Nullable<Integer>,
        fecha_censo -> Nullable<Date>,
        id_usuario -> Nullable<Integer>,   // surveyor
    }
}

diesel::table! {
    interferencia (id_interferencia) {
        id_interferencia -> Integer,
        id_arbol -> Integer,
        id_tipo_interferencia -> Integer,
        descripcion -> Nullable<Text>,
    }
}

diesel::table! {
    medicion (id_medicion) {
        id_medicion -> Integer,
        id_arbol -> Integer,
        fecha_medicion -> Nullable<Date>,
        ubicacion -> Nullable<Text>,
        calle -> Nullable<Text>,
        numero_aprox -> Nullable<Integer>,
        barrio -> Nullable<Text>,
        altura -> Nullable<Text>,
        diametro_tronco -> Nullable<Text>,
        id_estado_copa -> Nullable<Integer>,
        id_estado_tronco -> Nullable<Integer>,
        id_estado_base -> Nullable<Integer>,
        id_condicion -> Nullable<Integer>,
        ambito -> Nullable<Text>,
        ancho_vereda -> Nullable<Double>,
        distancia_otros_ejemplares -> Nullable<Double>,
        distancia_cordon -> Nullable<Double>,
        interferencia_aerea -> Nullable<Text>,
        especificacion_interferencia -> Nullable<Text>,
        tipo_cableado -> Nullable<Text>,
        requiere_intervencion -> Bool,
        tipo_intervencion -> Nullable<Text>,
        tratamiento_previo -> Nullable<Text>,
        cazuela -> Nullable<Text>,
        protegido -> Bool,
        detalles_arbol -> Nullable<Text>,
        absorcion_co2 -> Nullable<Double>,
        edad -> Nullable<Integer>,
        id_usuario -> Nullable<Integer>,
        tipo_dano -> Nullable<Text>,
        intervencion_programada -> Bool,
        imagen_dano -> Nullable<Text>,
    }
}

diesel::table! {
    foto (id_foto) {
        id_foto -> Integer,
        id_medicion -> Integer,
        tipo_foto -> Text,
        ruta_foto -> Text,
    }
}
