// src/rewrite/prompt.rs
//! Length-targeted broadcast prompt (Brazilian Portuguese newsroom register).

/// Average TTS reading pace used to turn seconds into a word budget.
pub const WORDS_PER_SECOND: f64 = 2.5;

pub fn target_word_count(duration_secs: u32) -> usize {
    (f64::from(duration_secs) * WORDS_PER_SECOND).floor() as usize
}

/// Estimated reading time, rounded up.
pub fn estimated_seconds(word_count: usize) -> u32 {
    (word_count as f64 / WORDS_PER_SECOND).ceil() as u32
}

pub fn build_prompt(source_text: &str, duration_secs: u32) -> String {
    let words = target_word_count(duration_secs);
    format!(
        "Reescreva esta notícia para rádio-jornalismo brasileiro com {words} palavras.

REGRAS:
- Exatamente {words} palavras (conte internamente, não mencione no texto)
- Estilo direto de rádio-jornalismo
- Números por extenso: \"1\" = \"um\", \"2025\" = \"dois mil e vinte e cinco\"
- Datas por extenso: \"01/08\" = \"primeiro de agosto\"
- Abreviações por extenso: \"Dr.\" = \"Doutor\"
- Sem referências a outros meios de comunicação, programas de TV, rádio ou vídeo
- Evite palavras que possam ser confundidas com outras na leitura em voz alta
- Linguagem clara para síntese de voz
- Comece direto com a notícia

PROIBIDO:
- Mencionar contagem de palavras ou tempo de leitura
- Incluir confirmações ou comentários técnicos
- Adicionar saudações, introduções ou despedidas
- Comentar sobre o processo de reescrita

TEXTO ORIGINAL:
{source}

RESPOSTA (apenas a notícia reescrita):
",
        source = source_text.trim()
    )
}
