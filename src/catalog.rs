//! Built-in study-plan catalog: the course offering of each trimester
//! group and the color clients use to paint its blocks.

/// Trimester groups run 1 through 12; group 12 is thesis work and has
/// no taught courses.
pub const TRIMESTER_COUNT: u8 = 12;

pub fn is_valid_trimester(trimester: u8) -> bool {
    (1..=TRIMESTER_COUNT).contains(&trimester)
}

/// Predefined course titles for a trimester group. Empty slice for
/// out-of-range groups and for group 12.
pub fn courses(trimester: u8) -> &'static [&'static str] {
    match trimester {
        1 => &[
            "Cálculo Diferencial",
            "Mecánica Clásica",
            "Ecología",
            "Química Universitaria",
        ],
        2 => &[
            "Cálculo Integral",
            "Lab de Mediciones y Mecánica",
            "Ondas Calor Fluidos",
            "Probabilidad Estadística",
            "Álgebra Lineal",
        ],
        3 => &[
            "Cálculo de Varias Variables",
            "Electricidad Magnetismo",
            "Laboratorio Física",
            "Circuitos Eléctricos 1",
            "Fundamentos de Programación",
            "Fundamentos Diseño Lógico",
        ],
        4 => &[
            "Ecuaciones Diferenciales",
            "Campos Electromagnéticos",
            "Dispositivos Electrónicos",
            "Circuitos Eléctricos 2",
            "Métodos Numéricos",
        ],
        5 => &[
            "Matemáticas para ICT",
            "Acondicionamiento de Señales Eléctricas",
            "Programación Orientada a Objetos",
            "Diseño Lógico Avanzado",
        ],
        6 => &[
            "Señales Sistemas",
            "Administración de Organizaciones",
            "Comunicaciones Analógicas",
            "Algoritmos Estructuras de Datos",
            "Sistemas Basados en Microcontroladores",
        ],
        7 => &["Control Analógico", "Bases de Datos", "Sistemas Operativos"],
        8 => &[
            "Comunicaciones Digitales",
            "Óptica Física Moderna",
            "Fundamentos de Admin de Proyectos de SW",
            "Redes de Comunicación",
        ],
        9 => &[
            "Procesamiento Digital de Señales",
            "Teoría de Información Codificación",
            "Física Electrónica",
            "Formulación de proyecto fundamento económico",
        ],
        10 => &[
            "Control Digital",
            "Laboratorio de Control",
            "Factibilidad tec económica financiera",
        ],
        11 => &["Emprendimiento social"],
        _ => &[],
    }
}

/// Display color for a trimester group's blocks.
pub fn color(trimester: u8) -> &'static str {
    match trimester {
        1 => "#FFCCCC",
        2 => "#FF9999",
        3 => "#FF6666",
        4 => "#FF3333",
        5 => "#FF0000",
        6 => "#CCFFCC",
        7 => "#99FF99",
        8 => "#66FF66",
        9 => "#33FF33",
        10 => "#00FF00",
        11 => "#CCCCFF",
        12 => "#9999FF",
        _ => "#FFFFFF",
    }
}
