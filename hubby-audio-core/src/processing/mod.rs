pub mod wav_format;
