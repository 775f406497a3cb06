// System instructions for the executive report and the sales chat.

pub const REPORT_SYSTEM_INSTRUCTION: &str = r#"
Actúas como analista senior de finanzas y operaciones. Recibes un resumen de ventas en JSON
y redactas un informe ejecutivo para la gerencia.

## FORMATO
- Escribe únicamente en ESPAÑOL.
- Devuelve HTML limpio: solo contenido (div, h3, p, ul, li, strong).
- No incluyas <html>, <head> ni <body>.
- No envuelvas la respuesta en bloques de código markdown.
- Resalta cifras clave con <strong>.

## SECCIONES
<h3>1. Resumen financiero</h3>
Ingresos totales, unidades y concentración en las tiendas y productos principales.
Señala si la serie diaria crece, cae o se mantiene.

<h3>2. Operaciones y abastecimiento</h3>
Tiendas con mayor movimiento y productos que no deben agotarse.
Usa la participación por línea para explicar el mix de ventas.

<h3>3. Recomendaciones</h3>
Tres acciones concretas y breves para mejorar rentabilidad o eficiencia.

Usa un tono profesional y directo. Básate solo en los datos recibidos; si un dato no está, no lo inventes.
"#;

pub const CHAT_SYSTEM_INSTRUCTION: &str = r#"
Eres un asistente que responde en lenguaje natural preguntas sobre datos de ventas.

## TAREA
1. Lee la pregunta y el resumen de los datos ya filtrados por tienda, producto o fechas.
2. Responde en ESPAÑOL, de forma clara y breve, citando las cifras del resumen.
3. Si se anuncia un gráfico, redacta la respuesta para acompañarlo.

## FORMATO
- HTML limpio sin <html>, <head> ni <body>.
- <p> para párrafos, <ul>/<li> para listas y <strong> para cifras importantes.
- Sin bloques de código markdown.

Sé amable y profesional. No inventes datos que no estén en el resumen.
"#;

pub const REPORT_FALLBACK_HTML: &str = "<p>No se pudo generar el reporte.</p>";

pub const CHAT_FALLBACK_HTML: &str = "<p>No se pudo generar una respuesta.</p>";

pub const CHAT_NO_DATA_HTML: &str = "<p>No se encontraron datos para tu consulta. Intenta con otros \
parámetros o verifica que hayas cargado datos en el sistema.</p>";

pub fn build_report_prompt(payload_json: &str) -> String {
    format!("Analiza estos datos de ventas: {}", payload_json)
}

pub fn build_chat_prompt(
    question: &str,
    summary_json: &str,
    conversation: Option<&str>,
    chart: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Pregunta del usuario: {}\n\nDatos resumidos encontrados:\n{}\n\n",
        question, summary_json
    );

    if let Some(conversation) = conversation {
        prompt.push_str("Contexto de la conversación:\n");
        prompt.push_str(conversation);
        prompt.push_str("\n\n");
    }

    match chart {
        Some(kind) => prompt.push_str(&format!(
            "Se generará un gráfico de tipo {} con los datos.\n\n",
            kind
        )),
        None => prompt.push_str("No se generará gráfico, solo texto.\n\n"),
    }

    prompt.push_str(
        "Genera una respuesta clara y concisa que responda la pregunta del usuario basándote en los datos.",
    );
    prompt
}

/// Removes a leading ```html fence and a trailing ``` fence if the model added them.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```html")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    without_close.trim().to_string()
}
